// Control-plane source: every v2 collection the console shows, listed
// concurrently and flattened into one record per resource. Role and
// security-group bindings are listed per owner once the owners are known.

use std::sync::Arc;

use futures_util::future::{BoxFuture, try_join_all};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use tracing::debug;

use overseer_api::ControlPlaneClient;
use overseer_api::types::CcResource;

use super::{SourceClient, fields, unreachable};
use crate::error::CoreError;
use crate::model::{Collection, NaturalKey, SourceKind, SourceRecord};

/// Relationship listings in flight at once.
const RELATION_CONCURRENCY: usize = 8;

const GROUP_SPACES: &[&str] = &["spaces"];

pub struct ControlPlaneSource {
    client: Arc<ControlPlaneClient>,
}

impl ControlPlaneSource {
    pub fn new(client: Arc<ControlPlaneClient>) -> Self {
        Self { client }
    }

    async fn fetch_all(&self) -> Result<Vec<SourceRecord>, CoreError> {
        let paged = Collection::CONTROL_PLANE_PAGED
            .iter()
            .map(|&(collection, path)| async move {
                let resources = self.client.list_all(path).await?;
                Ok::<_, overseer_api::Error>(
                    resources
                        .into_iter()
                        .map(|r| resource_record(collection, r, None))
                        .collect::<Vec<_>>(),
                )
            });

        let (paged, shared, private, flags) = tokio::try_join!(
            try_join_all(paged),
            self.client.list_all("v2/shared_domains"),
            self.client.list_all("v2/private_domains"),
            self.client.list_feature_flags(),
        )
        .map_err(|e| unreachable(SourceKind::ControlPlane, &e))?;

        let mut records: Vec<SourceRecord> = paged.into_iter().flatten().collect();
        records.extend(
            shared
                .into_iter()
                .map(|r| resource_record(Collection::Domains, r, Some(true))),
        );
        records.extend(
            private
                .into_iter()
                .map(|r| resource_record(Collection::Domains, r, Some(false))),
        );
        records.extend(flags.into_iter().filter_map(|flag| {
            let name = flag.get("name").and_then(Value::as_str)?.to_owned();
            Some(SourceRecord::new(
                Collection::FeatureFlags,
                NaturalKey::Name(name),
                flag,
            ))
        }));

        let relations = self.fetch_relations(&records).await?;
        records.extend(relations);

        debug!(records = records.len(), "control plane fetched");
        Ok(records)
    }

    async fn fetch_relations(&self, owners: &[SourceRecord]) -> Result<Vec<SourceRecord>, CoreError> {
        let pending: Vec<Relation> = owners.iter().flat_map(Relation::of).collect();

        let listed: Vec<Vec<SourceRecord>> = stream::iter(pending)
            .map(|relation| async move {
                let members = self.client.list_all(&relation.path()).await?;
                Ok::<_, overseer_api::Error>(
                    members
                        .into_iter()
                        .map(|member| relation.record(member))
                        .collect::<Vec<_>>(),
                )
            })
            .buffer_unordered(RELATION_CONCURRENCY)
            .try_collect()
            .await
            .map_err(|e| unreachable(SourceKind::ControlPlane, &e))?;

        Ok(listed.into_iter().flatten().collect())
    }
}

/// One `v2/{owner}/{guid}/{name}` listing.
struct Relation {
    collection: Collection,
    owner: String,
    name: &'static str,
}

impl Relation {
    /// Every relationship listing owned by `record`.
    fn of(record: &SourceRecord) -> Vec<Self> {
        let (collection, names) = match record.collection {
            Collection::Organizations => (Collection::OrganizationRoles, Collection::ORGANIZATION_ROLES),
            Collection::Spaces => (Collection::SpaceRoles, Collection::SPACE_ROLES),
            Collection::SecurityGroups => (Collection::SecurityGroupSpaces, GROUP_SPACES),
            _ => return Vec::new(),
        };
        let Some(owner) = record.str("guid") else {
            return Vec::new();
        };
        names
            .iter()
            .map(|&name| Self {
                collection,
                owner: owner.to_owned(),
                name,
            })
            .collect()
    }

    fn path(&self) -> String {
        let owners = match self.collection {
            Collection::OrganizationRoles => "organizations",
            Collection::SpaceRoles => "spaces",
            _ => "security_groups",
        };
        format!("v2/{owners}/{}/{}", self.owner, self.name)
    }

    fn record(&self, member: CcResource) -> SourceRecord {
        let guid = member.metadata.guid;
        match self.collection {
            Collection::SecurityGroupSpaces => SourceRecord::new(
                self.collection,
                NaturalKey::GroupSpace {
                    group: self.owner.clone(),
                    space: guid.clone(),
                },
                fields([
                    ("security_group_guid", Value::String(self.owner.clone())),
                    ("space_guid", Value::String(guid)),
                ]),
            ),
            collection => {
                let scope_field = if collection == Collection::OrganizationRoles {
                    "organization_guid"
                } else {
                    "space_guid"
                };
                let username = member.entity.get("username").cloned().unwrap_or(Value::Null);
                let record: Map<String, Value> = fields([
                    (scope_field, Value::String(self.owner.clone())),
                    ("role", Value::String(self.name.to_owned())),
                    ("user_guid", Value::String(guid.clone())),
                    ("username", username),
                ]);
                SourceRecord::new(
                    collection,
                    NaturalKey::Role {
                        scope: self.owner.clone(),
                        role: self.name.to_owned(),
                        user: guid,
                    },
                    record,
                )
            }
        }
    }
}

impl SourceClient for ControlPlaneSource {
    fn kind(&self) -> SourceKind {
        SourceKind::ControlPlane
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<SourceRecord>, CoreError>> {
        Box::pin(self.fetch_all())
    }
}

fn resource_record(collection: Collection, resource: CcResource, shared: Option<bool>) -> SourceRecord {
    let key = NaturalKey::Guid(resource.metadata.guid.clone());
    let mut fields = resource.into_fields();
    if let Some(shared) = shared {
        fields.insert("shared".into(), Value::Bool(shared));
    }
    SourceRecord::new(collection, key, fields)
}
