//! # Pony Mail setup CLI (`ponymail-setup`)
//!
//! Run once per deployment, from the `tools/` directory of a Pony Mail
//! checkout (the default artifact paths are relative to it).
//!
//! ## Examples
//!
//! ```bash
//! # Disposable setup against a local engine
//! ponymail-setup --defaults
//!
//! # Preseed a few values, answer the rest interactively
//! ponymail-setup --dbhost es1.example.org --dbshards 3 --generator redundant
//!
//! # Re-runnable in automation: leave an existing index alone
//! ponymail-setup --defaults --skiponexist
//! ```

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use ponymail_setup::bootstrap::{self, PythonEnvironment};
use ponymail_setup::config::{self, SetupFile};
use ponymail_setup::emit::{self, ArtifactPaths};
use ponymail_setup::engine::HttpSearchAdmin;
use ponymail_setup::logging;
use ponymail_setup::params::{IdGenerator, ParametersBuilder};
use ponymail_setup::prompt::Prompter;
use ponymail_setup::provision::{self, ProvisionOptions, ProvisionOutcome};

/// Pony Mail setup: create the search index and write configuration.
///
/// Any parameter not given by flag, `--defaults` or `--config` is asked for
/// interactively.
#[derive(Parser)]
#[command(name = "ponymail-setup", version, about)]
struct Cli {
    /// Use the built-in default settings.
    #[arg(long)]
    defaults: bool,

    /// Allow overwriting ponymail.cfg and config.lua (default: write *.tmp if either exists).
    #[arg(long)]
    clobber: bool,

    /// Search engine hostname.
    #[arg(long, value_parser = plain_text)]
    dbhost: Option<String>,

    /// Search engine port.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    dbport: Option<u16>,

    /// Index name.
    #[arg(long, value_parser = plain_text)]
    dbname: Option<String>,

    /// Shard count.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    dbshards: Option<u32>,

    /// Replica count.
    #[arg(long)]
    dbreplicas: Option<u32>,

    /// Host name of the outgoing mail server.
    #[arg(long, value_parser = plain_text)]
    mailserver: Option<String>,

    /// Domains to accept mail for via the UI (a domain or `*`).
    #[arg(long, value_parser = plain_text)]
    mldom: Option<String>,

    /// Enable the word cloud.
    #[arg(long, conflicts_with = "nocloud")]
    wordcloud: bool,

    /// Do not enable the word cloud.
    #[arg(long)]
    nocloud: bool,

    /// Exit successfully if the index already exists.
    #[arg(long)]
    skiponexist: bool,

    /// Do not create an index; assume it exists.
    #[arg(long)]
    noindex: bool,

    /// Document ID generator to use.
    #[arg(long, value_enum)]
    generator: Option<IdGenerator>,

    /// TOML file preseeding parameters and engine settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving ponymail.cfg.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Web site root holding api/lib/config.lua and js/config.js.
    #[arg(long, default_value = "../site")]
    site_dir: PathBuf,

    /// Python interpreter the archiver runs under.
    #[arg(long, env = "PONYMAIL_PYTHON", default_value = "python3")]
    python: String,

    /// pip used to install missing archiver modules.
    #[arg(long, env = "PONYMAIL_PIP", default_value = "pip3")]
    pip: String,

    /// Per-request timeout for the search engine, in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Retries for transient search engine failures.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn plain_text(value: &str) -> Result<String, String> {
    if value.chars().any(char::is_control) {
        return Err("control characters are not allowed".to_string());
    }
    Ok(value.to_string())
}

impl Cli {
    fn word_cloud(&self) -> Option<bool> {
        match (self.wordcloud, self.nocloud) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    fn apply(&self, builder: ParametersBuilder) -> ParametersBuilder {
        builder
            .search_host(self.dbhost.clone())
            .search_port(self.dbport)
            .index_name(self.dbname.clone())
            .outgoing_mail_host(self.mailserver.clone())
            .accepted_reply_domains(self.mldom.clone())
            .word_cloud(self.word_cloud())
            .generator(self.generator)
            .shard_count(self.dbshards)
            .replica_count(self.dbreplicas)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    let capability = bootstrap::ensure_client(&PythonEnvironment::new(&cli.python, &cli.pip))?;

    println!("Welcome to the Pony Mail setup script!");
    println!("Let's start by determining some settings...");
    println!();

    let setup_file = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => SetupFile::default(),
    };

    let builder = if cli.defaults {
        ParametersBuilder::defaults()
    } else {
        ParametersBuilder::new()
    };
    let builder = cli.apply(setup_file.deployment.apply(builder));
    let params = builder.complete(&mut Prompter::stdio())?;

    println!("Okay, I got all I need, setting up Pony Mail...");

    let mut engine = setup_file.engine.clone();
    if let Some(timeout) = cli.timeout {
        engine.timeout_secs = timeout;
    }
    if let Some(retries) = cli.max_retries {
        engine.max_retries = retries;
    }

    let admin = HttpSearchAdmin::new(params.search_host(), params.search_port(), &engine)?;
    let options = ProvisionOptions {
        skip_index: cli.noindex,
        skip_on_exists: cli.skiponexist,
    };

    match provision::provision_index(&admin, &params, options)? {
        ProvisionOutcome::AlreadyExists => {
            println!(
                "ElasticSearch index '{}' already exists and SOE set, exiting quietly",
                params.index_name()
            );
            return Ok(());
        }
        ProvisionOutcome::Created { acknowledgement } => {
            println!("Index created! {}", acknowledgement);
        }
        ProvisionOutcome::Disabled => {}
    }

    let paths = ArtifactPaths::new(&cli.output_dir, &cli.site_dir);
    let report = emit::emit_all(&params, capability, &paths, cli.clobber)?;

    println!("All done, Pony Mail should...work now :)");
    println!(
        "If you are using an external mail inbound server, \nmake sure to copy archiver.py and {} to it",
        report.archiver_config.display()
    );

    Ok(())
}
