use clap::Parser;
use metrics_federator::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    metrics_federator::init_logging(&cli);
    std::process::exit(metrics_federator::run(cli).await);
}
