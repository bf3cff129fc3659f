use clap::Parser;
use otpmig_lib::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    otpmig_lib::logging::init(cli.verbose);

    if let Err(e) = otpmig_lib::run(cli).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
