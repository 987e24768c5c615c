use clap::Parser;
use slabstore::server::cli::ServerArgs;

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();
    if let Err(err) = slabstore::server::run(args).await {
        if let Some(engine_err) = err.downcast_ref::<slabstore::error::EngineError>() {
            eprintln!("error: {engine_err}");
            std::process::exit(engine_err.exit_code());
        }
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
