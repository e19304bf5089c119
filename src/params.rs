//! Deployment parameters and the builder that collects them.
//!
//! Values arrive from up to four sources, applied in this order: the fixed
//! `--defaults` set, an optional preseed file, command-line flags, and
//! finally interactive prompts for whatever is still unset. Each source
//! only fills or overrides fields with values that already satisfy the
//! field's constraint, so a [`DeploymentParameters`] can only come out of
//! [`ParametersBuilder`] fully resolved.

use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use crate::error::SetupError;
use crate::prompt::Prompter;

/// Document ID generator used by the archiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdGenerator {
    Legacy,
    Medium,
    Redundant,
    Full,
}

impl IdGenerator {
    /// Menu order; prompt choice `n` selects `ALL[n - 1]`.
    pub const ALL: [IdGenerator; 4] = [
        IdGenerator::Legacy,
        IdGenerator::Medium,
        IdGenerator::Redundant,
        IdGenerator::Full,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IdGenerator::Legacy => "legacy",
            IdGenerator::Medium => "medium",
            IdGenerator::Redundant => "redundant",
            IdGenerator::Full => "full",
        }
    }

    fn description(self) -> &'static str {
        match self {
            IdGenerator::Legacy => {
                "LEGACY: The original document generator for v/0.1-0.8 (no longer recommended)"
            }
            IdGenerator::Medium => {
                "MEDIUM: The medium comprehensive generator for v/0.9 (no longer recommended)"
            }
            IdGenerator::Redundant => {
                "REDUNDANT: Near-full message digest, discard MTA trail (recommended for clustered setups)"
            }
            IdGenerator::Full => {
                "FULL: Full message digest with MTA trail (recommended for single-node setups)."
            }
        }
    }
}

impl fmt::Display for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IdGenerator {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IdGenerator::ALL
            .into_iter()
            .find(|g| g.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                SetupError::validation(
                    "generator",
                    format!("'{}' is not one of legacy, medium, redundant, full", s),
                )
            })
    }
}

/// Fully resolved deployment settings. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentParameters {
    search_host: String,
    search_port: u16,
    index_name: String,
    outgoing_mail_host: String,
    accepted_reply_domains: String,
    word_cloud: bool,
    generator: IdGenerator,
    shard_count: u32,
    replica_count: u32,
}

impl DeploymentParameters {
    pub fn search_host(&self) -> &str {
        &self.search_host
    }

    pub fn search_port(&self) -> u16 {
        self.search_port
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn outgoing_mail_host(&self) -> &str {
        &self.outgoing_mail_host
    }

    pub fn accepted_reply_domains(&self) -> &str {
        &self.accepted_reply_domains
    }

    pub fn word_cloud(&self) -> bool {
        self.word_cloud
    }

    pub fn generator(&self) -> IdGenerator {
        self.generator
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn replica_count(&self) -> u32 {
        self.replica_count
    }

    /// Base URL of the index as seen by the request layer.
    pub fn es_url(&self) -> String {
        format!(
            "http://{}:{}/{}/",
            self.search_host, self.search_port, self.index_name
        )
    }
}

/// Accumulates parameter values from every source.
///
/// Setters take `Option`s so callers can pass flag or file values straight
/// through; `None` and values that fail the field's constraint leave the
/// current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParametersBuilder {
    search_host: Option<String>,
    search_port: Option<u16>,
    index_name: Option<String>,
    outgoing_mail_host: Option<String>,
    accepted_reply_domains: Option<String>,
    word_cloud: Option<bool>,
    generator: Option<IdGenerator>,
    shard_count: Option<u32>,
    replica_count: Option<u32>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty() && !has_control(v))
}

fn has_control(value: &str) -> bool {
    value.chars().any(char::is_control)
}

impl ParametersBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed parameter set selected by `--defaults`, meant for
    /// disposable and test deployments.
    pub fn defaults() -> Self {
        Self {
            search_host: Some("localhost".to_string()),
            search_port: Some(9200),
            index_name: Some("ponymail".to_string()),
            outgoing_mail_host: Some("localhost".to_string()),
            accepted_reply_domains: Some("example.org".to_string()),
            word_cloud: Some(true),
            generator: Some(IdGenerator::Redundant),
            shard_count: Some(1),
            replica_count: Some(0),
        }
    }

    pub fn search_host(mut self, value: Option<String>) -> Self {
        if let Some(v) = non_empty(value) {
            self.search_host = Some(v);
        }
        self
    }

    pub fn search_port(mut self, value: Option<u16>) -> Self {
        if let Some(v) = value.filter(|p| *p >= 1) {
            self.search_port = Some(v);
        }
        self
    }

    pub fn index_name(mut self, value: Option<String>) -> Self {
        if let Some(v) = non_empty(value) {
            self.index_name = Some(v);
        }
        self
    }

    pub fn outgoing_mail_host(mut self, value: Option<String>) -> Self {
        if let Some(v) = non_empty(value) {
            self.outgoing_mail_host = Some(v);
        }
        self
    }

    pub fn accepted_reply_domains(mut self, value: Option<String>) -> Self {
        if let Some(v) = non_empty(value) {
            self.accepted_reply_domains = Some(v);
        }
        self
    }

    pub fn word_cloud(mut self, value: Option<bool>) -> Self {
        if value.is_some() {
            self.word_cloud = value;
        }
        self
    }

    pub fn generator(mut self, value: Option<IdGenerator>) -> Self {
        if value.is_some() {
            self.generator = value;
        }
        self
    }

    pub fn shard_count(mut self, value: Option<u32>) -> Self {
        if let Some(v) = value.filter(|n| *n >= 1) {
            self.shard_count = Some(v);
        }
        self
    }

    pub fn replica_count(mut self, value: Option<u32>) -> Self {
        if value.is_some() {
            self.replica_count = value;
        }
        self
    }

    /// Names of the fields still unset, in prompt order.
    fn missing(&self) -> Vec<&'static str> {
        let checks = [
            ("dbhost", self.search_host.is_none()),
            ("dbport", self.search_port.is_none()),
            ("dbname", self.index_name.is_none()),
            ("mailserver", self.outgoing_mail_host.is_none()),
            ("mldom", self.accepted_reply_domains.is_none()),
            ("wordcloud", self.word_cloud.is_none()),
            ("generator", self.generator.is_none()),
            ("dbshards", self.shard_count.is_none()),
            ("dbreplicas", self.replica_count.is_none()),
        ];
        checks
            .into_iter()
            .filter(|(_, unset)| *unset)
            .map(|(name, _)| name)
            .collect()
    }

    /// Finish without prompting. Fails naming the first unset field.
    pub fn build(self) -> Result<DeploymentParameters, SetupError> {
        fn require<T>(value: Option<T>, field: &'static str) -> Result<T, SetupError> {
            value.ok_or_else(|| SetupError::validation(field, "no value given"))
        }

        Ok(DeploymentParameters {
            search_host: require(self.search_host, "dbhost")?,
            search_port: require(self.search_port, "dbport")?,
            index_name: require(self.index_name, "dbname")?,
            outgoing_mail_host: require(self.outgoing_mail_host, "mailserver")?,
            accepted_reply_domains: require(self.accepted_reply_domains, "mldom")?,
            word_cloud: require(self.word_cloud, "wordcloud")?,
            generator: require(self.generator, "generator")?,
            shard_count: require(self.shard_count, "dbshards")?,
            replica_count: require(self.replica_count, "dbreplicas")?,
        })
    }

    /// Prompt for every unset field, in the fixed order, then build.
    ///
    /// Each prompt repeats until its answer is valid; only a closed input
    /// stream ends collection early.
    pub fn complete<R: BufRead, W: Write>(
        mut self,
        prompter: &mut Prompter<R, W>,
    ) -> Result<DeploymentParameters> {
        let missing = self.missing();
        if !missing.is_empty() {
            debug!(?missing, "prompting for unset parameters");
        }
        if self.search_host.is_none() {
            self.search_host = Some(prompter.ask(
                "dbhost",
                "What is the hostname of the ElasticSearch server? (e.g. localhost): ",
                |s| parse_non_empty("dbhost", s),
            )?);
        }
        if self.search_port.is_none() {
            self.search_port = Some(prompter.ask(
                "dbport",
                "What port is ElasticSearch listening on? (normally 9200): ",
                parse_port,
            )?);
        }
        if self.index_name.is_none() {
            self.index_name = Some(prompter.ask(
                "dbname",
                "What would you like to call the mail index (e.g. ponymail): ",
                |s| parse_non_empty("dbname", s),
            )?);
        }
        if self.outgoing_mail_host.is_none() {
            self.outgoing_mail_host = Some(prompter.ask(
                "mailserver",
                "What is the hostname of the outgoing mailserver? (e.g. mail.foo.org): ",
                |s| parse_non_empty("mailserver", s),
            )?);
        }
        if self.accepted_reply_domains.is_none() {
            self.accepted_reply_domains = Some(prompter.ask(
                "mldom",
                "Which domains would you accept mail to from web-replies? (e.g. foo.org or *): ",
                |s| parse_non_empty("mldom", s),
            )?);
        }
        if self.word_cloud.is_none() {
            self.word_cloud = Some(prompter.ask(
                "wordcloud",
                "Would you like to enable the word cloud feature? (Y/N): ",
                parse_yes_no,
            )?);
        }
        if self.generator.is_none() {
            self.generator = Some(prompter.ask(
                "generator",
                &generator_menu(),
                parse_generator_choice,
            )?);
        }
        if self.shard_count.is_none() {
            self.shard_count = Some(prompter.ask(
                "dbshards",
                "How many shards for the ElasticSearch index? ",
                parse_shard_count,
            )?);
        }
        if self.replica_count.is_none() {
            self.replica_count = Some(prompter.ask(
                "dbreplicas",
                "How many replicas for each shard? ",
                parse_replica_count,
            )?);
        }

        Ok(self.build()?)
    }
}

fn generator_menu() -> String {
    let mut menu = String::from("Please select a document ID generator:\n");
    for (i, g) in IdGenerator::ALL.iter().enumerate() {
        menu.push_str(&format!("{}  {}\n", i + 1, g.description()));
    }
    menu.push_str("Please select a generator [1-4]: ");
    menu
}

pub(crate) fn parse_non_empty(field: &'static str, input: &str) -> Result<String, SetupError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(SetupError::validation(field, "a value is required"));
    }
    if has_control(value) {
        return Err(SetupError::validation(field, "control characters are not allowed"));
    }
    Ok(value.to_string())
}

pub(crate) fn parse_port(input: &str) -> Result<u16, SetupError> {
    match input.trim().parse::<u16>() {
        Ok(p) if p >= 1 => Ok(p),
        _ => Err(SetupError::validation(
            "dbport",
            format!("'{}' is not a port number", input.trim()),
        )),
    }
}

pub(crate) fn parse_shard_count(input: &str) -> Result<u32, SetupError> {
    match input.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(SetupError::validation(
            "dbshards",
            format!("'{}' is not a positive integer", input.trim()),
        )),
    }
}

pub(crate) fn parse_replica_count(input: &str) -> Result<u32, SetupError> {
    input.trim().parse::<u32>().map_err(|_| {
        SetupError::validation(
            "dbreplicas",
            format!("'{}' is not a non-negative integer", input.trim()),
        )
    })
}

pub(crate) fn parse_yes_no(input: &str) -> Result<bool, SetupError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Ok(true),
        "n" | "no" => Ok(false),
        other => Err(SetupError::validation(
            "wordcloud",
            format!("expected Y or N, got '{}'", other),
        )),
    }
}

/// Accepts a menu number (1-4) or a generator name.
pub(crate) fn parse_generator_choice(input: &str) -> Result<IdGenerator, SetupError> {
    let input = input.trim();
    if let Ok(n) = input.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| IdGenerator::ALL.get(i).copied())
            .ok_or_else(|| {
                SetupError::validation("generator", format!("{} is not between 1 and 4", n))
            });
    }
    input.parse()
}
