// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Customer synchronizer (`res.partner` on the remote side).
//!
//! Export pushes contact fields and marks the partner as a customer via
//! `customer_rank`. The export changeset is keyed on account creation
//! time, so profile edits alone do not re-export an account.
//!
//! Import resolves identity in order: back-reference tag, mapping table,
//! then a case-insensitive email match against existing local accounts
//! (which adopts the account by creating the missing mapping), then
//! create. Created accounts get a generated unique username derived from
//! the email local part.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::config::Integration;
use crate::entity::Customer;
use crate::error::SyncError;
use crate::log::{RecordFailed, RecordSynced, SyncLogEntry};
use crate::rpc::{row, DomainTerm, RemoteRecord, SearchOptions};
use crate::sync::{payload, remote_timestamp, SyncContext};

pub(crate) const MODEL: &str = "res.partner";

pub(crate) const IMPORT_FIELDS: &[&str] =
    &["id", "name", "email", "phone", "street", "x_rentsync_id"];

/// Remote-shape projection of a local account.
#[derive(Debug, Serialize)]
struct CustomerExport<'a> {
    name: String,
    email: &'a str,
    phone: &'a str,
    street: &'a str,
    customer_rank: i64,
    company_id: i64,
    x_rentsync_id: i64,
}

impl<'a> CustomerExport<'a> {
    fn project(integration: &Integration, customer: &'a Customer) -> Self {
        Self {
            name: customer.full_name(),
            email: &customer.email,
            phone: &customer.phone,
            street: &customer.address,
            customer_rank: 1,
            company_id: integration.connection.company_id,
            x_rentsync_id: customer.id,
        }
    }
}

/// Typed view of a remote partner row.
#[derive(Debug)]
struct CustomerImport {
    remote_id: i64,
    tag: Option<i64>,
    name: String,
    email: Option<String>,
    phone: String,
    street: String,
}

impl CustomerImport {
    fn from_record(record: &RemoteRecord) -> Result<Self, SyncError> {
        Ok(Self {
            remote_id: row::required_int(record, "id", MODEL)?,
            tag: row::opt_int(record, "x_rentsync_id"),
            name: row::text(record, "name"),
            email: row::opt_str(record, "email"),
            phone: row::text(record, "phone"),
            street: row::text(record, "street"),
        })
    }
}

pub(crate) async fn export(
    ctx: &SyncContext<'_>,
    since: Option<DateTime<Utc>>,
    entry: &mut SyncLogEntry,
) -> Result<(), SyncError> {
    let customers = ctx.local.customers_created_since(since).await?;
    debug!(count = customers.len(), "customer export changeset");

    for customer in &customers {
        entry.records_processed += 1;
        match export_one(ctx, customer).await {
            Ok(record) => entry.record_success(record),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => entry.record_failure(RecordFailed {
                local_id: Some(customer.id),
                remote_id: None,
                name: customer.full_name(),
                error: err.to_string(),
            }),
        }
    }
    Ok(())
}

/// Push one customer, creating or updating the remote partner. Also used
/// by the dependency resolver for order and invoice export.
pub(crate) async fn export_one(
    ctx: &SyncContext<'_>,
    customer: &Customer,
) -> Result<RecordSynced, SyncError> {
    let integration = ctx.integration;
    let values = payload(&CustomerExport::project(integration, customer));

    let existing = ctx
        .mappings
        .find_by_local(integration.id, crate::EntityKind::Customer, customer.id)
        .await?;

    let remote_id = match existing {
        Some(mapping) => {
            ctx.client.write(MODEL, &[mapping.remote_id], values).await?;
            mapping.remote_id
        }
        None => ctx.client.create(MODEL, values).await?,
    };

    ctx.mappings
        .upsert(integration.id, crate::EntityKind::Customer, customer.id, remote_id)
        .await?;

    Ok(RecordSynced {
        local_id: customer.id,
        local_code: None,
        remote_id,
        name: customer.full_name(),
    })
}

pub(crate) async fn import(
    ctx: &SyncContext<'_>,
    since: Option<DateTime<Utc>>,
    entry: &mut SyncLogEntry,
) -> Result<(), SyncError> {
    let mut domain = vec![DomainTerm::gt("customer_rank", json!(0))];
    if let Some(watermark) = since {
        domain.push(DomainTerm::gt("write_date", json!(remote_timestamp(watermark))));
    }

    let records = ctx
        .client
        .search_read(MODEL, &domain, IMPORT_FIELDS, &SearchOptions::default())
        .await?;
    debug!(count = records.len(), "customer import changeset");

    for record in &records {
        entry.records_processed += 1;
        match import_one(ctx, record).await {
            Ok(synced) => entry.record_success(synced),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => entry.record_failure(RecordFailed {
                local_id: None,
                remote_id: row::opt_int(record, "id"),
                name: row::text(record, "name"),
                error: err.to_string(),
            }),
        }
    }
    Ok(())
}

/// Pull one remote partner into the local account table. Also used by the
/// dependency resolver during order and invoice import.
pub(crate) async fn import_one(
    ctx: &SyncContext<'_>,
    record: &RemoteRecord,
) -> Result<RecordSynced, SyncError> {
    let integration = ctx.integration;
    let incoming = CustomerImport::from_record(record)?;

    let mut target = None;
    if let Some(tagged_id) = incoming.tag {
        target = ctx.local.customer(tagged_id).await?;
    }
    if target.is_none() {
        if let Some(mapping) = ctx
            .mappings
            .find_by_remote(integration.id, crate::EntityKind::Customer, incoming.remote_id)
            .await?
        {
            target = ctx.local.customer(mapping.local_id).await?;
        }
    }
    // Adopt an existing local account with the same email address.
    if target.is_none() {
        if let Some(email) = &incoming.email {
            target = ctx.local.customer_by_email(email).await?;
        }
    }

    let local_id = match target {
        Some(mut customer) => {
            let (first, last) = split_name(&incoming.name);
            customer.first_name = first;
            customer.last_name = last;
            if let Some(email) = incoming.email {
                customer.email = email;
            }
            customer.phone = incoming.phone;
            customer.address = incoming.street;
            ctx.local.update_customer(&customer).await?;
            customer.id
        }
        None => {
            // A local account needs a contact address; partners without
            // one stay remote-only.
            let email = incoming.email.ok_or_else(|| SyncError::DependencyUnresolved {
                kind: crate::EntityKind::Customer,
                key: format!("partner {}", incoming.remote_id),
                reason: "remote partner has no email address".into(),
            })?;
            let (first, last) = split_name(&incoming.name);
            let customer = Customer {
                id: 0,
                username: generate_username(ctx, &email).await?,
                email,
                first_name: first,
                last_name: last,
                phone: incoming.phone,
                address: incoming.street,
                created_at: Utc::now(),
            };
            ctx.local.insert_customer(&customer).await?
        }
    };

    let mapping = ctx
        .mappings
        .upsert(
            integration.id,
            crate::EntityKind::Customer,
            local_id,
            incoming.remote_id,
        )
        .await?;

    Ok(RecordSynced {
        local_id: mapping.local_id,
        local_code: None,
        remote_id: incoming.remote_id,
        name: incoming.name,
    })
}

/// Split a display name at the first space: `"Ada Lovelace"` becomes
/// `("Ada", "Lovelace")`, a single token becomes the first name.
fn split_name(name: &str) -> (String, String) {
    match name.trim().split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.trim().to_string(), String::new()),
    }
}

/// Derive a unique username from the email local part, suffixing a
/// counter on collision.
async fn generate_username(ctx: &SyncContext<'_>, email: &str) -> Result<String, SyncError> {
    let base: String = email
        .split('@')
        .next()
        .unwrap_or(email)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect::<String>()
        .to_lowercase();
    let base = if base.is_empty() { "customer".to_string() } else { base };

    if !ctx.local.username_taken(&base).await? {
        return Ok(base);
    }
    let mut counter = 1u32;
    loop {
        let candidate = format!("{base}{counter}");
        if !ctx.local.username_taken(&candidate).await? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_at_first_space() {
        assert_eq!(split_name("Ada Lovelace"), ("Ada".into(), "Lovelace".into()));
        assert_eq!(
            split_name("Jean van der Berg"),
            ("Jean".into(), "van der Berg".into())
        );
        assert_eq!(split_name("Cher"), ("Cher".into(), String::new()));
        assert_eq!(split_name("  "), (String::new(), String::new()));
    }

    #[tokio::test]
    async fn generated_usernames_avoid_collisions() {
        let integration = crate::config::Integration::new(
            1,
            "main",
            crate::config::ConnectionConfig {
                url: "http://localhost:8069".into(),
                database: "rental".into(),
                username: "bot".into(),
                api_key: "key".into(),
                company_id: 1,
                version: "16.0".into(),
            },
        );
        let store = crate::storage::memory::MemoryStore::new();
        store.add_customer(Customer {
            id: 0,
            username: "ada.l".into(),
            email: "ada.l@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone: String::new(),
            address: String::new(),
            created_at: Utc::now(),
        });

        let client = crate::sync::resolve::tests_support::NullClient;
        let ctx = SyncContext {
            integration: &integration,
            client: &client,
            mappings: &store,
            local: &store,
        };

        assert_eq!(generate_username(&ctx, "ada.l@example.com").await.unwrap(), "ada.l1");
        assert_eq!(generate_username(&ctx, "new@example.com").await.unwrap(), "new");
    }
}
