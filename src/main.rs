use climate_one_lib::config::Settings;
use climate_one_lib::run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::new()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(settings.logger.level.as_str()))
        .format_timestamp_millis()
        .init();

    run(settings).await
}
