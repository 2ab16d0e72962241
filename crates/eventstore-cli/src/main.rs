use clap::Parser;
use eventstore_cli::{App, AppConfig, Cli, Command, Step, to_json};
use eventstore_logging::EventStoreSubscriberBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }

    // Set up logging
    let mut logging = EventStoreSubscriberBuilder::new().with_config(config.logging.clone());
    if let Some(level) = cli.log_level {
        logging = logging.with_level(level);
    }
    let _guard = logging.init();

    let app = App::open(&config).await?;

    let output = match cli.command {
        Command::Ingest { file } => to_json(&app.ingest(&file).await?)?,
        Command::Get {
            project,
            event_id,
            columns,
            body,
        } => to_json(&app.get(project, &event_id, &columns, body).await?)?,
        Command::List(args) => to_json(&app.list(&args).await?)?,
        Command::Next(args) => to_json(&app.neighbour(&args, Step::Next).await?)?,
        Command::Prev(args) => to_json(&app.neighbour(&args, Step::Prev).await?)?,
        Command::Gc => to_json(&app.gc().await?)?,
    };

    println!("{}", output);
    Ok(())
}
