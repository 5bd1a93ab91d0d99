//! Memory storage
//!
//! Will be destroyed on system shutdown

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use chrono::naive::NaiveDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::aliases::Alias;
use crate::links::DeletedBy;
use crate::links::ExpirationChange;
use crate::links::Link;
use crate::links::Owner;
use crate::organizations::Member;
use crate::organizations::Organization;
use crate::review::PendingLink;
use crate::review::ReviewStatus;
use crate::review::StatusChange;
use crate::security::domain_matches;
use crate::visits::Visit;
use crate::visits::Visitor;

use super::AuditEntry;
use super::CreateLinkValues;
use super::CreatePendingValues;
use super::CreateVisitValues;
use super::Error;
use super::NewMemberValues;
use super::Result;
use super::StatusChangeValues;
use super::Storage;
use super::UpdateLinkValues;

/// One entry on the in-memory audit trail
#[derive(Clone, Debug)]
#[allow(dead_code)] // written for operators, read through logs/debugging only
struct AuditRecord {
    /// Who did it
    actor: String,

    /// What happened
    action: &'static str,

    /// What it happened to
    subject: String,

    /// From where
    ip_address: Option<IpAddr>,

    /// When
    at: NaiveDateTime,
}

/// One role grant
#[derive(Clone, Debug)]
#[allow(dead_code)] // grant provenance, kept for debugging
struct RoleGrant {
    /// Who granted it
    granted_by: String,

    /// When
    at: NaiveDateTime,
}

/// An in-memory storage
///
/// Will be destroyed on system shutdown
#[derive(Clone, Debug)]
pub struct Memory {
    /// All links in storage, aliases embedded
    links: Arc<Mutex<HashMap<Uuid, Link>>>,

    /// The append-only visit log
    visits: Arc<Mutex<Vec<Visit>>>,

    /// Tracking identities, one per source address
    visitors: Arc<Mutex<HashMap<IpAddr, Visitor>>>,

    /// Links held for review, keyed by record ID
    pending: Arc<Mutex<HashMap<Uuid, PendingLink>>>,

    /// All organizations, keyed by name
    organizations: Arc<Mutex<HashMap<String, Organization>>>,

    /// Role grants, keyed by (role, entity)
    roles: Arc<Mutex<HashMap<(String, String), RoleGrant>>>,

    /// Known-phishing domains
    banned_domains: Arc<Mutex<Vec<String>>>,

    /// The audit trail
    audit_trail: Arc<Mutex<Vec<AuditRecord>>>,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new() -> Self {
        Self {
            links: Arc::new(Mutex::new(HashMap::new())),
            visits: Arc::new(Mutex::new(Vec::new())),
            visitors: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            organizations: Arc::new(Mutex::new(HashMap::new())),
            roles: Arc::new(Mutex::new(HashMap::new())),
            banned_domains: Arc::new(Mutex::new(Vec::new())),
            audit_trail: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[async_trait]
impl Storage for Memory {
    async fn find_all_links(&self) -> Result<Vec<Link>> {
        Ok(self
            .links
            .lock()
            .await
            .values()
            .filter(|link| !link.is_deleted())
            .cloned()
            .collect())
    }

    async fn find_links_by_owner(&self, owner: &Owner) -> Result<Vec<Link>> {
        Ok(self
            .links
            .lock()
            .await
            .values()
            .filter(|link| &link.owner == owner && !link.is_deleted())
            .cloned()
            .collect())
    }

    async fn find_links_by_owner_any(&self, owner: &Owner) -> Result<Vec<Link>> {
        Ok(self
            .links
            .lock()
            .await
            .values()
            .filter(|link| &link.owner == owner)
            .cloned()
            .collect())
    }

    async fn find_link_by_id(&self, id: &Uuid) -> Result<Option<Link>> {
        Ok(self.links.lock().await.get(id).cloned())
    }

    async fn find_link_by_alias(&self, alias: &str) -> Result<Option<(Link, Alias)>> {
        let links = self.links.lock().await;

        let mut deleted_match = None;

        for link in links.values() {
            if let Some(entry) = link.find_alias(alias) {
                if entry.is_deleted() {
                    deleted_match = Some((link.clone(), entry.clone()));
                } else {
                    return Ok(Some((link.clone(), entry.clone())));
                }
            }
        }

        Ok(deleted_match)
    }

    async fn find_link_ids_by_destination_fragment(&self, fragment: &str) -> Result<Vec<Uuid>> {
        Ok(self
            .links
            .lock()
            .await
            .values()
            .filter(|link| link.destination.contains(fragment))
            .map(|link| link.id)
            .collect())
    }

    async fn create_link(&self, values: &CreateLinkValues<'_>) -> Result<Link> {
        let link = Link {
            id: Uuid::new_v4(),
            title: values.title.to_string(),
            destination: values.destination.to_string(),
            owner: values.owner.clone(),
            visits: 0,
            unique_visits: 0,
            aliases: Vec::new(),
            created_at: now(),
            expires_at: values.expires_at,
            deleted_at: None,
            deleted_by: None,
        };

        self.links.lock().await.insert(link.id, link.clone());

        Ok(link)
    }

    async fn update_link(&self, id: &Uuid, values: &UpdateLinkValues<'_>) -> Result<Link> {
        Ok(self
            .links
            .lock()
            .await
            .get_mut(id)
            .map(|link| {
                if let Some(title) = values.title {
                    link.title = title.to_string();
                }

                if let Some(destination) = values.destination {
                    link.destination = destination.to_string();
                }

                match values.expiration {
                    ExpirationChange::Keep => {}
                    ExpirationChange::Set(expires_at) => link.expires_at = Some(*expires_at),
                    ExpirationChange::Clear => link.expires_at = None,
                }

                link.clone()
            })
            .expect("HashMap is the source of the link"))
    }

    async fn set_link_deleted(&self, id: &Uuid, deleted_by: &DeletedBy) -> Result<()> {
        if let Some(link) = self.links.lock().await.get_mut(id) {
            link.deleted_at = Some(now());
            link.deleted_by = Some(deleted_by.clone());
        }

        Ok(())
    }

    async fn restore_link(&self, id: &Uuid, deleted_by: &DeletedBy) -> Result<bool> {
        if let Some(link) = self.links.lock().await.get_mut(id) {
            if link.is_deleted() && link.deleted_by.as_ref() == Some(deleted_by) {
                link.deleted_at = None;
                link.deleted_by = None;

                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn insert_alias(&self, link_id: &Uuid, alias: &str, description: &str) -> Result<Alias> {
        let mut links = self.links.lock().await;

        // the unique-constraint: one live holder per name, and no second
        // entry with the same name on a single link
        for link in links.values() {
            if let Some(entry) = link.find_alias(alias) {
                if !entry.is_deleted() || &link.id == link_id {
                    return Err(Error::DuplicateAlias);
                }
            }
        }

        let entry = Alias {
            alias: alias.to_string(),
            description: description.to_string(),
            deleted_at: None,
        };

        links
            .get_mut(link_id)
            .expect("HashMap is the source of the link")
            .aliases
            .push(entry.clone());

        Ok(entry)
    }

    async fn restore_alias(&self, link_id: &Uuid, alias: &str, description: &str) -> Result<Alias> {
        let mut links = self.links.lock().await;

        for link in links.values() {
            if &link.id != link_id
                && link.find_alias(alias).is_some_and(|entry| !entry.is_deleted())
            {
                return Err(Error::DuplicateAlias);
            }
        }

        let link = links
            .get_mut(link_id)
            .expect("HashMap is the source of the link");

        let entry = link
            .aliases
            .iter_mut()
            .find(|entry| entry.alias == alias)
            .expect("restore only happens for present aliases");

        entry.deleted_at = None;
        entry.description = description.to_string();

        Ok(entry.clone())
    }

    async fn set_alias_deleted(&self, link_id: &Uuid, alias: &str) -> Result<()> {
        if let Some(link) = self.links.lock().await.get_mut(link_id) {
            if let Some(entry) = link.aliases.iter_mut().find(|entry| entry.alias == alias) {
                entry.deleted_at = Some(now());
            }
        }

        Ok(())
    }

    async fn increment_visit_counters(&self, link_id: &Uuid, first_time: bool) -> Result<()> {
        if let Some(link) = self.links.lock().await.get_mut(link_id) {
            link.visits += 1;

            if first_time {
                link.unique_visits += 1;
            }
        }

        Ok(())
    }

    async fn reset_visit_counters(&self, link_id: &Uuid) -> Result<()> {
        if let Some(link) = self.links.lock().await.get_mut(link_id) {
            link.visits = 0;
            link.unique_visits = 0;
        }

        Ok(())
    }

    async fn insert_visit(&self, values: &CreateVisitValues<'_>) -> Result<Visit> {
        let visit = Visit {
            id: Uuid::new_v4(),
            link_id: *values.link_id,
            alias: values.alias.to_string(),
            tracking_id: *values.tracking_id,
            source_ip: values.source_ip.copied(),
            time: now(),
            user_agent: values.user_agent.map(ToString::to_string),
            referer: values.referer.map(ToString::to_string),
            country_code: values.country_code.map(ToString::to_string),
            subdivision_code: values.subdivision_code.map(ToString::to_string),
        };

        self.visits.lock().await.push(visit.clone());

        Ok(visit)
    }

    async fn find_visits(&self, link_id: Option<&Uuid>, alias: Option<&str>) -> Result<Vec<Visit>> {
        Ok(self
            .visits
            .lock()
            .await
            .iter()
            .filter(|visit| link_id.is_none_or(|link_id| &visit.link_id == link_id))
            .filter(|visit| alias.is_none_or(|alias| visit.alias == alias))
            .cloned()
            .collect())
    }

    async fn visit_exists(&self, link_id: &Uuid, tracking_id: &Uuid) -> Result<bool> {
        Ok(self
            .visits
            .lock()
            .await
            .iter()
            .any(|visit| &visit.link_id == link_id && &visit.tracking_id == tracking_id))
    }

    async fn purge_visits(&self, link_id: &Uuid) -> Result<u64> {
        let mut visits = self.visits.lock().await;

        let before = visits.len();
        visits.retain(|visit| &visit.link_id != link_id);

        Ok((before - visits.len()) as u64)
    }

    async fn find_or_create_visitor(&self, ip: &IpAddr) -> Result<Visitor> {
        Ok(self
            .visitors
            .lock()
            .await
            .entry(*ip)
            .or_insert_with(|| Visitor {
                id: Uuid::new_v4(),
                ip: *ip,
                created_at: now(),
            })
            .clone())
    }

    async fn find_all_pending(&self, status: Option<ReviewStatus>) -> Result<Vec<PendingLink>> {
        Ok(self
            .pending
            .lock()
            .await
            .values()
            .filter(|pending| status.is_none_or(|status| pending.status == status))
            .cloned()
            .collect())
    }

    async fn find_pending_by_id(&self, id: &Uuid) -> Result<Option<PendingLink>> {
        Ok(self.pending.lock().await.get(id).cloned())
    }

    async fn find_pending_by_destination(
        &self,
        destination: &str,
    ) -> Result<Option<PendingLink>> {
        Ok(self
            .pending
            .lock()
            .await
            .values()
            .find(|pending| pending.destination == destination)
            .cloned())
    }

    async fn create_pending(&self, values: &CreatePendingValues<'_>) -> Result<PendingLink> {
        let submitted_by = match values.owner {
            Owner::User(username) => username.clone(),
            Owner::Organization(name) => name.clone(),
        };

        let pending = PendingLink {
            id: Uuid::new_v4(),
            title: values.title.to_string(),
            destination: values.destination.to_string(),
            owner: values.owner.clone(),
            expires_at: values.expires_at,
            status: ReviewStatus::Pending,
            status_history: vec![StatusChange {
                from: None,
                to: ReviewStatus::Pending,
                modified_by: submitted_by,
                at: now(),
            }],
            created_at: now(),
        };

        self.pending.lock().await.insert(pending.id, pending.clone());

        Ok(pending)
    }

    async fn update_pending_status(
        &self,
        id: &Uuid,
        values: &StatusChangeValues<'_>,
    ) -> Result<PendingLink> {
        Ok(self
            .pending
            .lock()
            .await
            .get_mut(id)
            .map(|pending| {
                pending.status = values.to;
                pending.status_history.push(StatusChange {
                    from: Some(values.from),
                    to: values.to,
                    modified_by: values.modified_by.to_string(),
                    at: now(),
                });

                pending.clone()
            })
            .expect("HashMap is the source of the pending link"))
    }

    async fn create_organization(&self, name: &str) -> Result<Organization> {
        Ok(self
            .organizations
            .lock()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Organization {
                name: name.to_string(),
                members: Vec::new(),
                created_at: now(),
            })
            .clone())
    }

    async fn find_organization(&self, name: &str) -> Result<Option<Organization>> {
        Ok(self.organizations.lock().await.get(name).cloned())
    }

    async fn add_organization_member(
        &self,
        name: &str,
        values: &NewMemberValues<'_>,
    ) -> Result<()> {
        if let Some(organization) = self.organizations.lock().await.get_mut(name) {
            if !organization.has_member(values.username) {
                organization.members.push(Member {
                    username: values.username.to_string(),
                    is_admin: values.is_admin,
                    joined_at: now(),
                });
            }
        }

        Ok(())
    }

    async fn organizations_of(&self, username: &str) -> Result<Vec<String>> {
        Ok(self
            .organizations
            .lock()
            .await
            .values()
            .filter(|organization| organization.has_member(username))
            .map(|organization| organization.name.clone())
            .collect())
    }

    async fn grant_role(&self, role: &str, entity: &str, granted_by: &str) -> Result<()> {
        self.roles.lock().await.insert(
            (role.to_string(), entity.to_string()),
            RoleGrant {
                granted_by: granted_by.to_string(),
                at: now(),
            },
        );

        Ok(())
    }

    async fn revoke_role(&self, role: &str, entity: &str) -> Result<()> {
        self.roles
            .lock()
            .await
            .remove(&(role.to_string(), entity.to_string()));

        Ok(())
    }

    async fn has_role(&self, role: &str, entity: &str) -> Result<bool> {
        Ok(self
            .roles
            .lock()
            .await
            .contains_key(&(role.to_string(), entity.to_string())))
    }

    async fn role_entities(&self, role: &str) -> Result<Vec<String>> {
        Ok(self
            .roles
            .lock()
            .await
            .keys()
            .filter(|(name, _)| name == role)
            .map(|(_, entity)| entity.clone())
            .collect())
    }

    async fn add_banned_domain(&self, domain: &str) -> Result<()> {
        let mut banned_domains = self.banned_domains.lock().await;

        if !banned_domains.iter().any(|known| known == domain) {
            banned_domains.push(domain.to_string());
        }

        Ok(())
    }

    async fn is_banned_domain(&self, host: &str) -> Result<bool> {
        Ok(self
            .banned_domains
            .lock()
            .await
            .iter()
            .any(|domain| domain_matches(host, domain)))
    }

    async fn register_audit_trail(
        &self,
        actor: &str,
        entry: &AuditEntry<'_>,
        ip_address: Option<&IpAddr>,
    ) -> Result<()> {
        let (action, subject) = match entry {
            AuditEntry::CreateLink(link) => ("create-link", link.id.to_string()),
            AuditEntry::UpdateLink(link) => ("update-link", link.id.to_string()),
            AuditEntry::DeleteLink(link) => ("delete-link", link.id.to_string()),
            AuditEntry::ClearVisits(link) => ("clear-visits", link.id.to_string()),
            AuditEntry::CreateAlias(link, alias) => {
                ("create-alias", format!("{}/{alias}", link.id))
            }
            AuditEntry::DeleteAlias(link, alias) => {
                ("delete-alias", format!("{}/{alias}", link.id))
            }
            AuditEntry::HoldForReview(pending) => ("hold-for-review", pending.id.to_string()),
            AuditEntry::PromoteReview(pending) => ("promote-review", pending.id.to_string()),
            AuditEntry::RejectReview(pending) => ("reject-review", pending.id.to_string()),
            AuditEntry::ReconsiderReview(pending) => {
                ("reconsider-review", pending.id.to_string())
            }
            AuditEntry::GrantRole(role, entity) => ("grant-role", format!("{role}/{entity}")),
            AuditEntry::RevokeRole(role, entity) => ("revoke-role", format!("{role}/{entity}")),
        };

        self.audit_trail.lock().await.push(AuditRecord {
            actor: actor.to_string(),
            action,
            subject,
            ip_address: ip_address.copied(),
            at: now(),
        });

        Ok(())
    }
}
