use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use digest_sheets::{load_articles, Article, DigestConfig, DigestStore, UpsertOutcome};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Command-line front-end for the reading digest spreadsheet.
#[derive(Debug, Parser)]
#[command(name = "digest", about = "Read and update the reading digest stored in Google Sheets.")]
pub struct Args {
    /// Config file (default: `$DIGEST_CONFIG`, then `digest.toml`).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List articles with their read flag.
    Articles {
        /// Only show articles not yet marked read.
        #[arg(long)]
        unread: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print a whole table.
    Table {
        name: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// List the tables in the spreadsheet.
    Tables,
    /// Set the read flag of one item (its URL).
    Mark {
        item_key: String,

        /// Mark as unread instead.
        #[arg(long)]
        unread: bool,
    },
    /// Replace a table's contents from a JSON file.
    ///
    /// Format: `{ "columns": ["A", "B"], "rows": [["1", "2"]] }`.
    Replace {
        name: String,

        #[arg(long, value_name = "FILE")]
        input: PathBuf,
    },
}

impl Args {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(DigestConfig::default_path)
    }
}

#[derive(Debug, Deserialize)]
struct TablePayload {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<String>>,
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    run_with_args(Args::parse())
}

pub fn run_with_args(args: Args) -> Result<()> {
    let path = args.config_path();
    log::debug!("loading config from {}", path.display());
    let config = DigestConfig::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    let store = DigestStore::connect(&config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(args.command(), &store, &config, &mut out)
}

/// Run one command against an already-built data layer, writing to `out`.
pub fn execute(
    command: &Command,
    store: &DigestStore,
    config: &DigestConfig,
    out: &mut impl Write,
) -> Result<()> {
    let store_id = config.store.spreadsheet_id.as_str();
    match command {
        Command::Articles { unread, format } => {
            let Some(mut articles) =
                load_articles(store, &config.store).context("failed to load articles")?
            else {
                writeln!(
                    out,
                    "`{}` has no articles yet. Add rows with columns: {}",
                    config.store.item_table,
                    config.store.required_columns.join(", ")
                )?;
                return Ok(());
            };
            if *unread {
                articles.retain(|a| !a.read);
            }
            match format {
                OutputFormat::Text => write_articles(out, &articles)?,
                OutputFormat::Json => {
                    serde_json::to_writer(&mut *out, &articles)?;
                    out.write_all(b"\n")?;
                }
            }
        }
        Command::Table { name, format } => {
            let snapshot = store
                .load_table(store_id, name)
                .with_context(|| format!("failed to read table `{name}`"))?;
            match format {
                OutputFormat::Text => {
                    if !snapshot.header().is_empty() {
                        writeln!(out, "{}", snapshot.header().join("\t"))?;
                    }
                    for row in snapshot.rows() {
                        writeln!(out, "{}", row.join("\t"))?;
                    }
                }
                OutputFormat::Json => {
                    serde_json::to_writer(&mut *out, snapshot.as_ref())?;
                    out.write_all(b"\n")?;
                }
            }
        }
        Command::Tables => {
            let tables = store
                .list_tables(store_id)
                .context("failed to list tables")?;
            let mut titles: Vec<&String> = tables.keys().collect();
            titles.sort();
            for title in titles {
                writeln!(out, "{title}")?;
            }
        }
        Command::Mark { item_key, unread } => {
            let read = !*unread;
            let outcome = store
                .upsert(store_id, item_key, read)
                .with_context(|| format!("failed to update read flag for {item_key}"))?;
            let state = if read { "read" } else { "unread" };
            match outcome {
                UpsertOutcome::Updated { row } => {
                    writeln!(out, "marked {item_key} as {state} (row {row})")?;
                }
                UpsertOutcome::Appended => {
                    writeln!(out, "marked {item_key} as {state} (new row)")?;
                }
            }
        }
        Command::Replace { name, input } => {
            let payload = read_payload(input)?;
            store
                .write_full_table(store_id, name, &payload.columns, &payload.rows)
                .with_context(|| format!("failed to rewrite table `{name}`"))?;
            writeln!(out, "wrote {} row(s) to `{name}`", payload.rows.len())?;
        }
    }
    Ok(())
}

fn read_payload(path: &Path) -> Result<TablePayload> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let payload: TablePayload = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    if payload.columns.is_empty() {
        anyhow::bail!("{} has no columns", path.display());
    }
    Ok(payload)
}

fn write_articles(out: &mut impl Write, articles: &[Article]) -> Result<()> {
    if articles.is_empty() {
        writeln!(out, "No articles.")?;
        return Ok(());
    }
    for article in articles {
        let mark = if article.read { "[x]" } else { "[ ]" };
        let date = match article.date {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => article.date_raw.clone(),
        };
        writeln!(out, "{mark} {date:<10} {} ({})", article.title, article.author)?;
        if !article.category.is_empty() {
            writeln!(out, "    {}", article.category)?;
        }
        writeln!(out, "    {}", article.url)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_defaults_to_read() {
        let args = Args::try_parse_from(["digest", "mark", "http://a"]).unwrap();
        assert_eq!(
            args.command(),
            &Command::Mark {
                item_key: "http://a".into(),
                unread: false
            }
        );
        assert!(args.config.is_none());
    }

    #[test]
    fn config_flag_is_accepted_after_the_subcommand() {
        let args =
            Args::try_parse_from(["digest", "table", "ReadStatus", "--format", "json", "--config", "x.toml"])
                .unwrap();
        assert_eq!(args.config_path(), PathBuf::from("x.toml"));
        assert_eq!(
            args.command(),
            &Command::Table {
                name: "ReadStatus".into(),
                format: OutputFormat::Json
            }
        );
    }

    #[test]
    fn replace_requires_an_input_file() {
        assert!(Args::try_parse_from(["digest", "replace", "Articles"]).is_err());
        let args =
            Args::try_parse_from(["digest", "replace", "Articles", "--input", "rows.json"]).unwrap();
        assert!(matches!(args.command(), Command::Replace { input, .. } if input == Path::new("rows.json")));
    }
}
