// Identity source: SCIM users and groups, OAuth clients, identity zones
// and identity providers.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use overseer_api::IdentityClient;

use super::{SourceClient, unreachable};
use crate::error::CoreError;
use crate::model::{Collection, NaturalKey, SourceKind, SourceRecord};

pub struct IdentitySource {
    client: Arc<IdentityClient>,
}

impl IdentitySource {
    pub fn new(client: Arc<IdentityClient>) -> Self {
        Self { client }
    }

    async fn fetch_all(&self) -> Result<Vec<SourceRecord>, CoreError> {
        let (users, groups, clients, zones, providers) = tokio::try_join!(
            self.client.list_users(),
            self.client.list_groups(),
            self.client.list_clients(),
            self.client.list_identity_zones(),
            self.client.list_identity_providers(),
        )
        .map_err(|e| unreachable(SourceKind::Identity, &e))?;

        let records = keyed(Collection::IdentityUsers, "id", users, NaturalKey::Guid)
            .chain(keyed(Collection::IdentityGroups, "id", groups, NaturalKey::Guid))
            .chain(keyed(
                Collection::IdentityClients,
                "client_id",
                clients,
                NaturalKey::Name,
            ))
            .chain(keyed(Collection::IdentityZones, "id", zones, NaturalKey::Guid))
            .chain(keyed(Collection::IdentityProviders, "id", providers, NaturalKey::Guid))
            .collect();
        Ok(records)
    }
}

impl SourceClient for IdentitySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Identity
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<SourceRecord>, CoreError>> {
        Box::pin(self.fetch_all())
    }
}

/// Records whose key is read from `field`; entries without one are skipped.
fn keyed(
    collection: Collection,
    field: &'static str,
    items: Vec<Map<String, Value>>,
    key: fn(String) -> NaturalKey,
) -> impl Iterator<Item = SourceRecord> {
    items.into_iter().filter_map(move |item| {
        let id = item.get(field).and_then(Value::as_str)?.to_owned();
        Some(SourceRecord::new(collection, key(id), item))
    })
}
