use relay_service::{
    cli::{self, Mode},
    client, config, error, logging, server,
};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();

    let mode = match cli::parse_args(std::env::args().skip(1)) {
        Ok(Some(mode)) => mode,
        Ok(None) => {
            println!("Please provide a port number!\n{}", cli::USAGE);
            return Ok(());
        }
        Err(e) => {
            eprintln!("{e}\n{}", cli::USAGE);
            return Ok(());
        }
    };

    let result = match mode {
        Mode::Create { port } => {
            let cfg = config::Config::from_env(port)?;
            server::run(cfg).await
        }
        Mode::Join { addr } => client::run(&addr).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "relay-service exited with error");
    }
    result
}
