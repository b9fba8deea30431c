
pub mod aggregator;
pub mod backoff;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod error;
pub mod persistence;
pub mod sse;
pub mod supervisor;

use {
    config::Config,
    persistence::StateStore,
    std::process::ExitCode,
    supervisor::Session,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = Config::from_env();
    let store = StateStore::new(&config.metrics_path, &config.state_path, &config.alerts_path);

    log::info!("Starting wikiflow");

    let mut session = Session::start(&config, &store);
    match session.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Session failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
