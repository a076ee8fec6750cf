/// Evalap - regional evaluation and activity report review service

use evalap::{config::ServerConfig, error::AppResult, server, AppContext};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> AppResult<()> {
    let config = ServerConfig::from_env()?;

    init_tracing(config.logging.json);
    print_banner();

    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "evalap=debug,tower_http=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn print_banner() {
    println!(
        r#"
     ______            __
    / ____/   ______ _/ /___ _____
   / __/ | | / / __ `/ / __ `/ __ \
  / /___ | |/ / /_/ / / /_/ / /_/ /
 /_____/ |___/\__,_/_/\__,_/ .___/
                          /_/
        Evaluation & report review v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
