// Copyright 2023 Remi Bernotavicius

use std::path::PathBuf;

/// Settings shared by every subcommand; each flag falls back to an environment variable.
#[derive(clap::Args, Debug, Clone)]
pub struct Config {
    /// Where the SQLite database lives. Defaults to `data.sqlite` in the data directory.
    #[arg(long, env = "FOODGRAM_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// Root of uploaded recipe images. Defaults to `media/` in the data directory.
    #[arg(long, env = "FOODGRAM_MEDIA_DIR", global = true)]
    pub media_dir: Option<PathBuf>,

    #[arg(long, env = "FOODGRAM_POOL_SIZE", default_value_t = 8, global = true)]
    pub pool_size: u32,

    #[arg(long, env = "FOODGRAM_LOG", default_value_t = log::LevelFilter::Info, global = true)]
    pub log_level: log::LevelFilter,
}

impl Config {
    pub fn database_path(&self) -> crate::Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(crate::data_path()?.join("data.sqlite")),
        }
    }

    pub fn media_path(&self) -> crate::Result<PathBuf> {
        let path = match &self.media_dir {
            Some(path) => path.clone(),
            None => crate::data_path()?.join("media"),
        };
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeConfig {
    #[arg(long, env = "FOODGRAM_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Default number of entries per page for paginated listings.
    #[arg(
        long,
        env = "FOODGRAM_PAGE_SIZE",
        default_value_t = 6,
        value_parser = clap::value_parser!(i64).range(1..=crate::pagination::MAX_PAGE_SIZE)
    )]
    pub page_size: i64,

    /// Origins allowed to call the API from a browser; any origin when empty.
    #[arg(long, env = "FOODGRAM_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

#[cfg(test)]
#[derive(clap::Parser)]
struct ServeArgs {
    #[command(flatten)]
    serve: ServeConfig,
}

#[test]
fn page_size_is_bounded() {
    use clap::Parser as _;

    let args = ServeArgs::try_parse_from(["foodgram", "--page-size", "10"]).unwrap();
    assert_eq!(args.serve.page_size, 10);
    assert!(ServeArgs::try_parse_from(["foodgram", "--page-size", "0"]).is_err());
    assert!(ServeArgs::try_parse_from(["foodgram", "--page-size=-1"]).is_err());
    assert!(ServeArgs::try_parse_from(["foodgram", "--page-size", "101"]).is_err());
}
