//! Idempotent creation of the archive index.
//!
//! Given the deployment parameters and the schema registry, make sure the
//! target index exists with the intended mappings, or decline to act:
//!
//! 1. index management disabled → nothing happens
//! 2. index exists, skipping allowed → [`ProvisionOutcome::AlreadyExists`]
//! 3. index exists, skipping not allowed → [`SetupError::Conflict`]
//! 4. index absent → one create-index call carrying shards, replicas and
//!    every document-type mapping
//!
//! Creation is all-or-nothing from this tool's point of view. The engine
//! gives no transactional guarantee, so a half-created index is left for
//! the operator to remove.

use anyhow::Result;
use serde_json::{json, Value};
use tracing::info;

use crate::engine::SearchAdmin;
use crate::error::SetupError;
use crate::params::DeploymentParameters;
use crate::schema::{self, DocType, MappingDialect};

/// Newest engine major that accepts one mapping type per document type.
const LAST_MULTI_TYPE_MAJOR: u32 = 5;

/// Operator switches controlling provisioning.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionOptions {
    /// `--noindex`: assume the index already matches the schema.
    pub skip_index: bool,
    /// `--skiponexist`: an existing index ends the run successfully.
    pub skip_on_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    Disabled,
    AlreadyExists,
    Created { acknowledgement: Value },
}

/// Everything a create-index call carries.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub index_name: String,
    pub shard_count: u32,
    pub replica_count: u32,
    pub schemas: Vec<DocType>,
}

impl IndexRequest {
    pub fn new(params: &DeploymentParameters) -> Self {
        Self {
            index_name: params.index_name().to_string(),
            shard_count: params.shard_count(),
            replica_count: params.replica_count(),
            schemas: DocType::ALL.to_vec(),
        }
    }

    /// Request body: index settings plus per-type mappings.
    pub fn body(&self, dialect: MappingDialect) -> Value {
        json!({
            "settings": {
                "number_of_shards": self.shard_count,
                "number_of_replicas": self.replica_count,
            },
            "mappings": schema::mappings(&self.schemas, dialect),
        })
    }
}

/// Ensure the index described by `params` exists.
///
/// # Errors
///
/// - [`SetupError::Conflict`] when the index exists and skipping is off.
/// - [`SetupError::Provisioning`] when any engine call fails, including
///   exhausted retries.
pub fn provision_index(
    admin: &dyn SearchAdmin,
    params: &DeploymentParameters,
    options: ProvisionOptions,
) -> Result<ProvisionOutcome> {
    if options.skip_index {
        info!("index management disabled, assuming index exists");
        return Ok(ProvisionOutcome::Disabled);
    }

    let request = IndexRequest::new(params);
    let index = request.index_name.as_str();

    let exists = admin.index_exists(index).map_err(provisioning)?;
    if exists {
        if options.skip_on_exists {
            return Ok(ProvisionOutcome::AlreadyExists);
        }
        return Err(SetupError::Conflict {
            index: index.to_string(),
        }
        .into());
    }

    let major = admin.server_major_version().map_err(provisioning)?;
    if let Some(v) = major.filter(|v| *v > LAST_MULTI_TYPE_MAJOR) {
        return Err(SetupError::Provisioning(format!(
            "search engine {}.x does not accept multiple mapping types per index; \
             Pony Mail needs {}.x or earlier",
            v, LAST_MULTI_TYPE_MAJOR
        ))
        .into());
    }
    let dialect = MappingDialect::for_engine(major);

    println!("Creating index {}", index);
    info!(
        index,
        shards = request.shard_count,
        replicas = request.replica_count,
        ?dialect,
        "creating index"
    );

    let acknowledgement = admin
        .create_index(index, &request.body(dialect))
        .map_err(provisioning)?;

    Ok(ProvisionOutcome::Created { acknowledgement })
}

fn provisioning(err: anyhow::Error) -> anyhow::Error {
    SetupError::Provisioning(format!("{:#}", err)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{IdGenerator, ParametersBuilder};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingAdmin {
        exists: bool,
        version: Option<u32>,
        fail_create: bool,
        created: RefCell<Vec<(String, Value)>>,
    }

    impl SearchAdmin for RecordingAdmin {
        fn server_major_version(&self) -> Result<Option<u32>> {
            Ok(self.version)
        }

        fn index_exists(&self, _index: &str) -> Result<bool> {
            Ok(self.exists)
        }

        fn create_index(&self, index: &str, body: &Value) -> Result<Value> {
            if self.fail_create {
                anyhow::bail!("connection refused");
            }
            self.created
                .borrow_mut()
                .push((index.to_string(), body.clone()));
            Ok(json!({ "acknowledged": true }))
        }
    }

    fn params() -> DeploymentParameters {
        ParametersBuilder::defaults()
            .outgoing_mail_host(Some("mail.example.org".into()))
            .generator(Some(IdGenerator::Full))
            .build()
            .unwrap()
    }

    #[test]
    fn absent_index_is_created_once() {
        let admin = RecordingAdmin {
            version: Some(5),
            ..Default::default()
        };
        let outcome = provision_index(&admin, &params(), ProvisionOptions::default()).unwrap();
        assert_eq!(
            outcome,
            ProvisionOutcome::Created {
                acknowledgement: json!({ "acknowledged": true })
            }
        );

        let created = admin.created.borrow();
        assert_eq!(created.len(), 1);
        let (index, body) = &created[0];
        assert_eq!(index, "ponymail");
        assert_eq!(
            body["mappings"]["mbox"]["properties"]["message-id"],
            json!({ "type": "keyword" })
        );
        assert_eq!(body["settings"]["number_of_shards"], 1);
        assert_eq!(body["settings"]["number_of_replicas"], 0);
        assert_eq!(body["mappings"].as_object().unwrap().len(), 6);
    }

    #[test]
    fn legacy_engine_gets_legacy_mappings() {
        let admin = RecordingAdmin {
            version: Some(2),
            ..Default::default()
        };
        provision_index(&admin, &params(), ProvisionOptions::default()).unwrap();
        let created = admin.created.borrow();
        assert_eq!(
            created[0].1["mappings"]["mbox"]["properties"]["message-id"],
            json!({ "type": "string", "index": "not_analyzed" })
        );
    }

    #[test]
    fn single_type_engine_is_refused_before_create() {
        let admin = RecordingAdmin {
            version: Some(6),
            ..Default::default()
        };
        let err = provision_index(&admin, &params(), ProvisionOptions::default()).unwrap_err();
        match err.downcast_ref::<SetupError>() {
            Some(SetupError::Provisioning(cause)) => assert!(cause.contains("6.x")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(admin.created.borrow().is_empty());
    }

    #[test]
    fn existing_index_with_skip_is_success() {
        let admin = RecordingAdmin {
            exists: true,
            ..Default::default()
        };
        let options = ProvisionOptions {
            skip_on_exists: true,
            ..Default::default()
        };
        let outcome = provision_index(&admin, &params(), options).unwrap();
        assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
        assert!(admin.created.borrow().is_empty());
    }

    #[test]
    fn existing_index_without_skip_conflicts() {
        let admin = RecordingAdmin {
            exists: true,
            ..Default::default()
        };
        let err = provision_index(&admin, &params(), ProvisionOptions::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SetupError>(),
            Some(SetupError::Conflict { index }) if index == "ponymail"
        ));
        assert!(admin.created.borrow().is_empty());
    }

    #[test]
    fn noindex_never_contacts_engine() {
        struct Unreachable;
        impl SearchAdmin for Unreachable {
            fn server_major_version(&self) -> Result<Option<u32>> {
                panic!("contacted engine")
            }
            fn index_exists(&self, _: &str) -> Result<bool> {
                panic!("contacted engine")
            }
            fn create_index(&self, _: &str, _: &Value) -> Result<Value> {
                panic!("contacted engine")
            }
        }

        let options = ProvisionOptions {
            skip_index: true,
            skip_on_exists: false,
        };
        let outcome = provision_index(&Unreachable, &params(), options).unwrap();
        assert_eq!(outcome, ProvisionOutcome::Disabled);
    }

    #[test]
    fn create_failure_is_provisioning_error() {
        let admin = RecordingAdmin {
            fail_create: true,
            ..Default::default()
        };
        let err = provision_index(&admin, &params(), ProvisionOptions::default()).unwrap_err();
        match err.downcast_ref::<SetupError>() {
            Some(SetupError::Provisioning(cause)) => assert!(cause.contains("connection refused")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
