use clap::Parser;
use slabstore::loader::cli::LoaderArgs;

fn main() {
    let args = LoaderArgs::parse();
    if let Err(err) = slabstore::loader::run(args) {
        if let Some(engine_err) = err.downcast_ref::<slabstore::error::EngineError>() {
            eprintln!("error: {engine_err}");
            std::process::exit(engine_err.exit_code());
        }
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
