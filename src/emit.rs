//! Derived configuration artifacts.
//!
//! One [`DeploymentParameters`] value is rendered into:
//!
//! | Artifact | Default location | Consumer |
//! |----------|------------------|----------|
//! | archiver config | `./ponymail.cfg` | mail archiver |
//! | server config | `../site/api/lib/config.lua` | Lua request layer |
//! | client config | `../site/js/config.js` | browser client |
//!
//! The two generated files never silently replace an operator's edits: when
//! the canonical file exists and clobbering was not requested, the output
//! goes to `<name>.tmp` next to it. The client config is only seeded from
//! its bundled sample, and only when missing.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::bootstrap::ClientCapability;
use crate::params::DeploymentParameters;

/// Where each artifact lives.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub archiver_config: PathBuf,
    pub server_config: PathBuf,
    pub client_config: PathBuf,
    pub client_sample: PathBuf,
}

impl ArtifactPaths {
    /// Conventional layout: archiver config in `output_dir`, site files
    /// beneath `site_dir`.
    pub fn new(output_dir: &Path, site_dir: &Path) -> Self {
        let js = site_dir.join("js");
        Self {
            archiver_config: output_dir.join("ponymail.cfg"),
            server_config: site_dir.join("api").join("lib").join("config.lua"),
            client_config: js.join("config.js"),
            client_sample: js.join("config.js.sample"),
        }
    }
}

/// Paths actually written by [`emit_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitReport {
    pub archiver_config: PathBuf,
    pub server_config: PathBuf,
    /// `None` when the client config already existed or no sample was found.
    pub client_config: Option<PathBuf>,
}

/// Render and write every artifact.
pub fn emit_all(
    params: &DeploymentParameters,
    capability: ClientCapability,
    paths: &ArtifactPaths,
    clobber: bool,
) -> Result<EmitReport> {
    let archiver_config = write_artifact(
        &paths.archiver_config,
        &render_archiver_config(params, capability),
        clobber,
    )?;
    println!("Writing importer config ({})", archiver_config.display());

    let server_config =
        write_artifact(&paths.server_config, &render_server_config(params), clobber)?;
    println!("mod_lua configuration ({})", server_config.display());

    println!("Copying sample JS config to config.js (if needed)...");
    let client_config = seed_client_config(&paths.client_sample, &paths.client_config)?;

    Ok(EmitReport {
        archiver_config,
        server_config,
        client_config,
    })
}

/// Write `contents` to `canonical`, or to its `.tmp` sibling when the
/// canonical file exists and `clobber` is off. Returns the path written.
pub fn write_artifact(canonical: &Path, contents: &str, clobber: bool) -> Result<PathBuf> {
    let target = if !clobber && canonical.exists() {
        let tmp = tmp_path(canonical);
        warn!(
            existing = %canonical.display(),
            written = %tmp.display(),
            "config exists and clobber is not set"
        );
        tmp
    } else {
        canonical.to_path_buf()
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(&target, contents)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    info!(path = %target.display(), "wrote config");
    Ok(target)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Copy `sample` to `target` if `target` is missing and `sample` exists.
pub fn seed_client_config(sample: &Path, target: &Path) -> Result<Option<PathBuf>> {
    if target.exists() || !sample.exists() {
        return Ok(None);
    }
    fs::copy(sample, target).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            sample.display(),
            target.display()
        )
    })?;
    info!(path = %target.display(), "seeded client config from sample");
    Ok(Some(target.to_path_buf()))
}

/// Importer configuration read by the archiver.
pub fn render_archiver_config(params: &DeploymentParameters, capability: ClientCapability) -> String {
    let consistency = if capability.waits_for_active_shards() {
        "wait:                  active shard count"
    } else {
        "write:                 consistency level (default quorum)"
    };

    format!(
        r#"
###############################################################
# Pony Mail Configuration file

# Main ES configuration
[elasticsearch]
hostname:               {host}
dbname:                 {dbname}
port:                   {port}
ssl:                    false

#uri:                   url_prefix

#user:                  username
#password:              password

#{consistency}

#backup:                database name

[archiver]
generator:              {generator}

[debug]
#cropout:               string to crop from list-id

###############################################################
"#,
        host = params.search_host(),
        dbname = params.index_name(),
        port = params.search_port(),
        consistency = consistency,
        generator = params.generator(),
    )
}

/// Lua configuration table read by the request layer.
pub fn render_server_config(params: &DeploymentParameters) -> String {
    format!(
        r#"
local config = {{
    es_url = "{es_url}",
    mailserver = "{mailserver}",
--  mailport = 1025, -- override the default port (25)
    accepted_domains = "{domains}",
    wordcloud = {wordcloud},
    email_footer = nil, -- see the docs for how to set this up.
    full_headers = false,
    maxResults = 5000, -- max emails to return in one go. Might need to be bumped for large lists
--  stats_maxBody = 200, -- max size of body snippet returned by stats.lua
--  stats_wordExclude = ".|..|...", -- patterns to exclude from word cloud generated by stats.lua
    admin_oauth = {{}}, -- list of domains that may do administrative oauth (private list access)
                     -- add 'www.googleapis.com' to the list for google oauth to decide, for instance.
    oauth_fields = {{ -- used for specifying individual oauth handling parameters.
-- for example:
--        internal = {{
--            email = 'CAS-EMAIL',
--            name = 'CAS-NAME',
--            uid = 'REMOTE-USER',
--            env = 'subprocess' -- use environment vars instead of request headers
--        }}
    }},
--  allow_insecure_cookie = true, -- override the default (false) - only use for test installations
--  no_association = {{}}, -- domains that are not allowed for email association
--  listsDisplay = 'regex', -- if defined, hide list names that don't match the regex
--  debug = false, -- whether to return debug information
    antispam = true  -- Whether or not to add anti-spam measures aimed at anonymous users.
}}
return config
"#,
        es_url = lua_escape(&params.es_url()),
        mailserver = lua_escape(params.outgoing_mail_host()),
        domains = lua_escape(params.accepted_reply_domains()),
        wordcloud = params.word_cloud(),
    )
}

/// Escape a value for a double-quoted Lua string literal.
fn lua_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{IdGenerator, ParametersBuilder};

    fn params() -> DeploymentParameters {
        ParametersBuilder::defaults()
            .search_host(Some("es.example.org".into()))
            .outgoing_mail_host(Some("mail.example.org".into()))
            .generator(Some(IdGenerator::Full))
            .build()
            .unwrap()
    }

    #[test]
    fn archiver_config_carries_connection_and_generator() {
        let cfg = render_archiver_config(&params(), ClientCapability::default());
        assert!(cfg.contains("hostname:               es.example.org\n"));
        assert!(cfg.contains("dbname:                 ponymail\n"));
        assert!(cfg.contains("port:                   9200\n"));
        assert!(cfg.contains("ssl:                    false\n"));
        assert!(cfg.contains("generator:              full\n"));
    }

    #[test]
    fn consistency_clause_follows_client_version() {
        let v5 = render_archiver_config(&params(), ClientCapability::new(Some(5)));
        assert!(v5.contains("#wait:                  active shard count"));
        assert!(!v5.contains("#write:"));

        for version in [None, Some(2), Some(6)] {
            let cfg = render_archiver_config(&params(), ClientCapability::new(version));
            assert!(cfg.contains("#write:                 consistency level (default quorum)"));
            assert!(!cfg.contains("#wait:"));
        }
    }

    #[test]
    fn server_config_values() {
        let lua = render_server_config(&params());
        assert!(lua.contains(r#"es_url = "http://es.example.org:9200/ponymail/","#));
        assert!(lua.contains(r#"mailserver = "mail.example.org","#));
        assert!(lua.contains(r#"accepted_domains = "example.org","#));
        assert!(lua.contains("wordcloud = true,"));
        assert!(lua.contains("antispam = true"));
        assert!(lua.contains("maxResults = 5000"));
        assert!(lua.trim_end().ends_with("return config"));
    }

    #[test]
    fn server_config_escapes_strings() {
        let p = ParametersBuilder::defaults()
            .accepted_reply_domains(Some(r#"a"b\c"#.into()))
            .build()
            .unwrap();
        let lua = render_server_config(&p);
        assert!(lua.contains(r#"accepted_domains = "a\"b\\c","#));
    }

    #[test]
    fn existing_file_diverts_to_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().join("ponymail.cfg");
        fs::write(&canonical, "operator edits").unwrap();

        let written = write_artifact(&canonical, "generated", false).unwrap();
        assert_eq!(written, dir.path().join("ponymail.cfg.tmp"));
        assert_eq!(fs::read_to_string(&canonical).unwrap(), "operator edits");
        assert_eq!(fs::read_to_string(&written).unwrap(), "generated");
    }

    #[test]
    fn clobber_overwrites_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().join("config.lua");
        fs::write(&canonical, "operator edits").unwrap();

        let written = write_artifact(&canonical, "generated", true).unwrap();
        assert_eq!(written, canonical);
        assert_eq!(fs::read_to_string(&canonical).unwrap(), "generated");
        assert!(!dir.path().join("config.lua.tmp").exists());
    }

    #[test]
    fn missing_parents_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().join("site/api/lib/config.lua");
        let written = write_artifact(&canonical, "x", false).unwrap();
        assert_eq!(written, canonical);
    }

    #[test]
    fn client_sample_seeded_only_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), &dir.path().join("site"));
        fs::create_dir_all(paths.client_sample.parent().unwrap()).unwrap();

        // No sample: nothing to do.
        assert_eq!(
            seed_client_config(&paths.client_sample, &paths.client_config).unwrap(),
            None
        );

        fs::write(&paths.client_sample, "var sample = 1;").unwrap();
        let seeded = seed_client_config(&paths.client_sample, &paths.client_config).unwrap();
        assert_eq!(seeded, Some(paths.client_config.clone()));
        assert_eq!(
            fs::read_to_string(&paths.client_config).unwrap(),
            "var sample = 1;"
        );

        fs::write(&paths.client_config, "var edited = 2;").unwrap();
        assert_eq!(
            seed_client_config(&paths.client_sample, &paths.client_config).unwrap(),
            None
        );
        assert_eq!(
            fs::read_to_string(&paths.client_config).unwrap(),
            "var edited = 2;"
        );
    }

    #[test]
    fn emit_all_writes_canonical_paths_when_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), &dir.path().join("site"));
        let report = emit_all(&params(), ClientCapability::default(), &paths, false).unwrap();

        assert_eq!(report.archiver_config, paths.archiver_config);
        assert_eq!(report.server_config, paths.server_config);
        assert_eq!(report.client_config, None);
        assert!(fs::read_to_string(&paths.server_config)
            .unwrap()
            .contains("http://es.example.org:9200/ponymail/"));
    }
}
