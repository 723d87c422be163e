//! `wigwam data`: Search the data catalog and fetch test inputs.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use wigwam_data::catalog::{Catalog, CatalogItem};
use wigwam_data::fetch::FetchOrchestrator;
use wigwam_data::search::{CatalogField, SearchQuery, filtered_search, names_only, search};
use wigwam_workflow::testdb::{TestDatabase, parse_test_id};

use super::Context;

/// Arguments for the `data` command.
#[derive(Args, Debug)]
pub struct DataArgs {
    /// Data operation to perform.
    #[command(subcommand)]
    pub command: DataCommand,
}

/// Data operations.
#[derive(Subcommand, Debug)]
pub enum DataCommand {
    /// Print catalog entries matching a query as JSON.
    Search(SearchArgs),
    /// Print the names of catalog entries matching a query.
    Names(QueryArgs),
    /// Fetch matching repositories into the cache.
    Fetch(FetchArgs),
}

/// Catalog query options shared by the data commands.
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Catalog file.
    #[arg(short, long, value_name = "FILENAME")]
    pub file: Option<PathBuf>,

    /// Tag set; entries carrying every tag match. Repeatable.
    #[arg(short, long, num_args = 1.., value_name = "TAG")]
    pub tags: Vec<Vec<String>>,

    /// Entry name or glob.
    #[arg(short, long, num_args = 1.., value_name = "NAME")]
    pub names: Vec<String>,

    /// Match every entry.
    #[arg(short, long)]
    pub all: bool,
}

impl QueryArgs {
    fn catalog(&self, ctx: &Context) -> anyhow::Result<Catalog> {
        let path = self.file.as_ref().unwrap_or(&ctx.config.catalog_file);
        Catalog::load(path).map_err(|e| anyhow::anyhow!("{e}"))
    }

    fn query(&self, extra_names: Vec<String>) -> SearchQuery {
        let mut names = self.names.clone();
        for name in extra_names {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        SearchQuery {
            tags: self
                .tags
                .iter()
                .map(|set| set.iter().cloned().collect())
                .collect(),
            names,
            all: self.all,
        }
    }
}

/// Arguments for `data search`.
#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Fields to print. All fields by default.
    #[arg(long, num_args = 1.., value_name = "FIELD")]
    pub fields: Vec<String>,
}

/// Arguments for `data fetch`.
#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Also fetch the inputs of these tests, in WORKFLOW:TEST format.
    #[arg(long = "tests", num_args = 1.., value_name = "WORKFLOW:TEST")]
    pub tests: Vec<String>,

    /// Workflow test database.
    #[arg(long)]
    pub test_file: Option<PathBuf>,

    /// Host cache directory.
    #[arg(short, long)]
    pub cache: Option<PathBuf>,

    /// Refetch even if the cache already holds the data.
    #[arg(long)]
    pub no_cache: bool,

    /// Maximum number of concurrent fetches.
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// Executes the `data` command.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read, the query is invalid,
/// or a fetch fails.
pub fn execute(args: DataArgs, ctx: &Context) -> anyhow::Result<()> {
    match args.command {
        DataCommand::Search(args) => execute_search(&args, ctx),
        DataCommand::Names(args) => execute_names(&args, ctx),
        DataCommand::Fetch(args) => execute_fetch(&args, ctx),
    }
}

fn execute_search(args: &SearchArgs, ctx: &Context) -> anyhow::Result<()> {
    let catalog = args.query.catalog(ctx)?;
    let fields: Vec<CatalogField> = if args.fields.is_empty() {
        CatalogField::ALL.to_vec()
    } else {
        args.fields
            .iter()
            .map(|f| f.parse::<CatalogField>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("{e}"))?
    };
    let rows = filtered_search(&catalog, &args.query.query(Vec::new()), &fields)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn execute_names(args: &QueryArgs, ctx: &Context) -> anyhow::Result<()> {
    let catalog = args.catalog(ctx)?;
    for name in names_only(&catalog, &args.query(Vec::new())).map_err(|e| anyhow::anyhow!("{e}"))? {
        println!("{name}");
    }
    Ok(())
}

fn test_input_names(args: &FetchArgs, ctx: &Context) -> anyhow::Result<Vec<String>> {
    if args.tests.is_empty() {
        return Ok(Vec::new());
    }
    let path = args.test_file.as_ref().unwrap_or(&ctx.config.test_file);
    let db = TestDatabase::load(path).map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut names = Vec::new();
    for id in &args.tests {
        let (workflow, test) = parse_test_id(id).map_err(|e| anyhow::anyhow!("{e}"))?;
        let spec = db.get(&workflow, &test).map_err(|e| anyhow::anyhow!("{e}"))?;
        names.extend(spec.inputs.repos());
    }
    Ok(names)
}

fn execute_fetch(args: &FetchArgs, ctx: &Context) -> anyhow::Result<()> {
    let catalog = args.query.catalog(ctx)?;
    let query = args.query.query(test_input_names(args, ctx)?);
    let items: Vec<&CatalogItem> = search(&catalog, &query).map_err(|e| anyhow::anyhow!("{e}"))?;
    if items.is_empty() {
        eprintln!("No data repositories matched.");
        return Ok(());
    }

    let backend = ctx.backend()?;
    let workers = args.workers.unwrap_or(ctx.config.fetch_workers);
    let orchestrator = FetchOrchestrator::new(backend.as_ref(), &ctx.config.fetch_image, workers)
        .with_pull_source(ctx.config.fetch_image_source.clone());
    let cache = args.cache.as_ref().unwrap_or(&ctx.config.cache_dir);
    let mount = orchestrator
        .cache_mount(cache)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    eprintln!("Fetching {} data repositories into {}", items.len(), mount.host_path().display());
    let fetched = orchestrator
        .fetch(&items, &mount, args.no_cache)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    for name in fetched {
        println!("{name}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Command};
    use clap::Parser;

    fn data(args: &[&str]) -> DataCommand {
        let argv = ["wigwam", "data"].iter().chain(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Data(args) => args.command,
            other => unreachable!("parsed {other:?}"),
        }
    }

    #[test]
    fn repeated_tag_flags_form_alternative_sets() {
        let DataCommand::Names(query) = data(&["names", "-t", "a", "b", "-t", "c"]) else {
            unreachable!("expected names")
        };
        let query = query.query(Vec::new());
        assert_eq!(query.tags.len(), 2);
        assert!(query.tags[0].contains("b"));
        assert!(query.tags[1].contains("c"));
    }

    #[test]
    fn test_inputs_extend_names_without_duplicates() {
        let DataCommand::Fetch(args) = data(&["fetch", "-n", "DEM", "L0B"]) else {
            unreachable!("expected fetch")
        };
        let query = args.query.query(vec!["L0B".into(), "RSLC".into()]);
        assert_eq!(query.names, vec!["DEM", "L0B", "RSLC"]);
    }

    #[test]
    fn search_fields_parse() {
        let DataCommand::Search(args) = data(&["search", "-a", "--fields", "name", "url"]) else {
            unreachable!("expected search")
        };
        assert!(args.query.all);
        assert_eq!(args.fields, vec!["name", "url"]);
    }
}
