//! Pre-flight check for the archiver's search-engine client.
//!
//! The archiver that reads `ponymail.cfg` is a Python program and needs the
//! packages in [`ARCHIVER_PACKAGES`]. This module makes sure they can be
//! imported before any other step runs, installing them when the tool is
//! run with administrative privilege. The probe also reports the installed
//! client's major version, which decides one clause of the archiver config
//! (see [`ClientCapability`]).

use anyhow::{Context, Result};
use std::process::Command;
use tracing::{info, warn};

use crate::error::SetupError;

/// Python packages the archiver imports.
pub const ARCHIVER_PACKAGES: [&str; 4] = ["elasticsearch", "formatflowed", "netaddr", "certifi"];

const PROBE_SCRIPT: &str = "import elasticsearch, formatflowed, netaddr, certifi\n\
                            print(elasticsearch.VERSION[0])";

/// What the installed client can do, as far as the emitted config cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientCapability {
    /// Major version of the installed client, if it could be determined.
    pub major_version: Option<u32>,
}

impl ClientCapability {
    pub fn new(major_version: Option<u32>) -> Self {
        Self { major_version }
    }

    /// 5.x clients replaced the write-consistency setting with a wait for
    /// active shards.
    pub fn waits_for_active_shards(&self) -> bool {
        self.major_version == Some(5)
    }
}

/// Result of looking for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Importable; carries the major version when it could be parsed.
    Present(Option<u32>),
    Missing,
}

/// The environment the archiver will run in.
pub trait ClientEnvironment {
    fn probe(&self) -> Probe;
    /// Whether the current principal may install system packages.
    fn is_privileged(&self) -> bool;
    fn install(&self, packages: &[&str]) -> Result<()>;
}

/// Make sure the client is available, installing it when allowed.
///
/// # Errors
///
/// [`SetupError::Environment`] when the client is missing and either the
/// principal is unprivileged or the installation fails.
pub fn ensure_client(env: &dyn ClientEnvironment) -> Result<ClientCapability> {
    if let Probe::Present(version) = env.probe() {
        return Ok(present(version));
    }

    let packages = ARCHIVER_PACKAGES.join(" ");

    if !env.is_privileged() {
        return Err(SetupError::Environment {
            message: format!(
                "It looks like you need to install some python modules first.\n\
                 Either run this as root to do so, or run:\n\
                 pip3 install {}",
                packages
            ),
        }
        .into());
    }

    println!("Before we get started, we need to install some modules");
    println!("Hang on!");

    let installed = env
        .install(&ARCHIVER_PACKAGES)
        .map(|_| env.probe());

    match installed {
        Ok(Probe::Present(version)) => Ok(present(version)),
        Ok(Probe::Missing) => Err(install_failed(&packages, "modules still not importable")),
        Err(e) => Err(install_failed(&packages, &format!("{:#}", e))),
    }
}

fn present(version: Option<u32>) -> ClientCapability {
    match version {
        Some(v) => info!(major = v, "search engine client found"),
        None => warn!("search engine client found but its version could not be read"),
    }
    ClientCapability::new(version)
}

fn install_failed(packages: &str, cause: &str) -> anyhow::Error {
    SetupError::Environment {
        message: format!(
            "Installing python modules failed ({}).\n\
             Please install them before you try again:\n\
             pip3 install {}",
            cause, packages
        ),
    }
    .into()
}

/// Probes a Python interpreter and installs through pip.
pub struct PythonEnvironment {
    python: String,
    pip: String,
}

impl PythonEnvironment {
    pub fn new(python: impl Into<String>, pip: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            pip: pip.into(),
        }
    }
}

impl ClientEnvironment for PythonEnvironment {
    fn probe(&self) -> Probe {
        let output = match Command::new(&self.python).args(["-c", PROBE_SCRIPT]).output() {
            Ok(output) => output,
            Err(e) => {
                warn!(python = %self.python, error = %e, "could not run python interpreter");
                return Probe::Missing;
            }
        };

        if !output.status.success() {
            return Probe::Missing;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Probe::Present(parse_major(&stdout))
    }

    fn is_privileged(&self) -> bool {
        for var in ["LOGNAME", "USER"] {
            if let Ok(name) = std::env::var(var) {
                if !name.is_empty() {
                    return name == "root";
                }
            }
        }
        Command::new("id")
            .arg("-u")
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).trim() == "0")
            .unwrap_or(false)
    }

    fn install(&self, packages: &[&str]) -> Result<()> {
        let status = Command::new(&self.pip)
            .arg("install")
            .args(packages)
            .status()
            .with_context(|| format!("Failed to run {}", self.pip))?;

        if !status.success() {
            anyhow::bail!("{} install exited with {}", self.pip, status);
        }
        Ok(())
    }
}

/// First line of probe output that parses as a version number.
fn parse_major(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .filter_map(|l| l.trim().parse::<u32>().ok())
        .next()
}
