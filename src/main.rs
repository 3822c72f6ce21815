// Copyright 2023 Remi Bernotavicius

use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;

mod api;
mod catalog;
mod config;
mod database;
mod document;
mod error;
mod images;
mod import;
mod pagination;
mod recipes;
mod relations;
mod shopping_list;
mod users;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug)]
#[command(about = "Recipe sharing service")]
struct Args {
    #[command(flatten)]
    config: config::Config,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve(config::ServeConfig),
    /// Load a JSON array of `{name, measurement_unit}` objects.
    LoadIngredients { path: PathBuf },
    /// Load a JSON array of `{name, color, slug}` objects.
    LoadTags { path: PathBuf },
    /// Change the role of an existing account; grants admin by default.
    Promote {
        email: String,
        #[arg(long, default_value_t = database::models::UserRole::Admin)]
        role: database::models::UserRole,
    },
}

/// This is where the database and uploaded media live on-disk by default. On Linux it should be
/// like: `~/.local/share/foodgram/`
fn data_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().ok_or("failed to get user home directory")?;
    let path = dirs.data_dir().join("foodgram");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

fn serve(config: &config::Config, serve_config: &config::ServeConfig) -> Result<()> {
    let pool = database::establish_pool(config.database_path()?, config.pool_size)?;
    let state = api::AppState::new(pool, config.media_path()?, serve_config.page_size);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(api::serve(state, serve_config))
}

/// Runs `f` on a connection to the configured database, for the one-shot subcommands.
fn with_connection<T>(
    config: &config::Config,
    f: impl FnOnce(&mut database::Connection) -> Result<T>,
) -> Result<T> {
    let pool = database::establish_pool(config.database_path()?, 1)?;
    let mut conn = pool.get()?;
    f(&mut conn)
}

fn main() -> Result<()> {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(args.config.log_level)
        .init()?;

    match &args.commands {
        Commands::Serve(serve_config) => serve(&args.config, serve_config)?,
        Commands::LoadIngredients { path } => with_connection(&args.config, |conn| {
            import::import_fixtures::<import::IngredientFixture>(conn, path)
        })?,
        Commands::LoadTags { path } => with_connection(&args.config, |conn| {
            import::import_fixtures::<import::TagFixture>(conn, path)
        })?,
        Commands::Promote { email, role } => {
            let user = with_connection(&args.config, |conn| {
                Ok(users::set_role(conn, email, *role)?)
            })?;
            log::info!("{} is now {}", user.email, user.role);
        }
    }
    Ok(())
}

#[test]
fn subcommands_reuse_the_database_file() {
    let path = std::env::temp_dir().join(format!("foodgram-{}.sqlite", uuid::Uuid::new_v4()));
    let config = config::Config {
        database: Some(path.clone()),
        media_dir: None,
        pool_size: 1,
        log_level: log::LevelFilter::Info,
    };

    with_connection(&config, |conn| {
        users::signup_for_test(conn, "ann");
        Ok(())
    })
    .unwrap();
    let user = with_connection(&config, |conn| {
        Ok(users::set_role(conn, "ann@example.com", database::models::UserRole::Admin)?)
    })
    .unwrap();
    assert!(user.is_admin());

    std::fs::remove_file(path).unwrap();
}
