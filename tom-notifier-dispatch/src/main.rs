mod application;
mod dto;
mod error;
mod repository;
mod service;

use application::ApplicationEnv;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[cfg(debug_assertions)]
    {
        // Ignore error because .env file is not required
        // as long as env variables are set
        let _ = dotenvy::dotenv();
    }

    let env = ApplicationEnv::parse()?;

    application::setup_tracing(&env)?;

    let state = application::create_state(&env).await?;
    tracing::info!("dispatch worker started");

    application::shutdown_signal().await;

    application::close(state).await;

    Ok(())
}
