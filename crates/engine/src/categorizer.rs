//! Free-tier cost categorization by user provenance. Paid events bypass
//! everything into a single paid bucket; free events are bucketed by what
//! the identity tables say about the acting user.

use margin_core::types::{AccountSource, IdentityBundle, Membership, UsageEvent};
use std::collections::HashMap;
use tracing::warn;

/// Disposable-email domains. Additions are a code change, not data.
const TEMP_EMAIL_DOMAINS: &[&str] = &[
    "protectsmail.net",
    "roratu.com",
    "mucate.com",
    "mekuron.com",
    "airsworld.net",
    "arugy.com",
    "forexzig.com",
    "fxzig.com",
    "denipl.com",
    "denipl.net",
    "nctime.com",
    "fftube.com",
    "correostemporales.org",
    "yopmail.com",
    "rosuper.com",
    "ssgperf.com",
    "m3player.com",
    "guerrillamail.com",
    "guerrillamail.org",
    "guerrillamailblock.com",
    "pokemail.net",
    "spam4.me",
    "grr.la",
    "guerrillamail.biz",
    "guerrillamail.de",
    "trbvm.com",
    "mailinator.com",
    "10minutemail.com",
    "temp-mail.org",
    "throwaway.email",
    "getnada.com",
    "maildrop.cc",
    "trashmail.com",
    "tempmailaddress.com",
    "fakeinbox.com",
    "mytemp.email",
    "tempmail.com",
    "emailondeck.com",
    "sharklasers.com",
    "discard.email",
    "discardmail.com",
    "mintemail.com",
    "mailnesia.com",
    "mohmal.com",
    "crazymailing.com",
    "mailcatch.com",
    "mailnator.com",
    "tempr.email",
    "tempinbox.com",
    "spamgourmet.com",
    "mailexpire.com",
    "dispostable.com",
    "filzmail.com",
    "getairmail.com",
    "harakirimail.com",
    "anonymbox.com",
];

/// Consumer webmail domains where "+" sub-addressing marks alias abuse.
const WEBMAIL_ALIAS_DOMAINS: &[&str] = &["gmail.com", "googlemail.com"];

/// Sums and counts for one free-tier bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FreeBucket {
    pub cost: f64,
    pub task_count: u64,
    pub user_count: u64,
}

/// Categorizer output. Invariants: `free_cost` equals the sum of the five
/// free buckets, and `total_cost == paid_cost + free_cost`. Excluded users
/// contribute to no bucket at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostReport {
    pub paid_cost: f64,
    pub paid_task_count: u64,
    pub regular_email: FreeBucket,
    pub temp_email: FreeBucket,
    pub aliased_email: FreeBucket,
    pub deleted_account: FreeBucket,
    pub visitor: FreeBucket,
    pub free_cost: f64,
    pub free_task_count: u64,
    pub free_user_count: u64,
    /// Free users with no live identity, no audit entry, and no recognized
    /// ledger provenance. Counted and logged, never summed into a bucket.
    pub excluded_user_count: u64,
}

impl CostReport {
    pub fn total_cost(&self) -> f64 {
        self.paid_cost + self.free_cost
    }
}

fn email_domain(email: &str) -> Option<&str> {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => {
            Some(domain)
        }
        _ => None,
    }
}

fn is_temp_email(email: &str) -> bool {
    email_domain(email)
        .map(|d| d.to_ascii_lowercase())
        .is_some_and(|d| TEMP_EMAIL_DOMAINS.contains(&d.as_str()))
}

/// "+" in the local part of a consumer webmail address.
fn is_aliased_email(email: &str) -> bool {
    let Some(domain) = email_domain(email) else {
        return false;
    };
    let domain = domain.to_ascii_lowercase();
    if !WEBMAIL_ALIAS_DOMAINS.contains(&domain.as_str()) {
        return false;
    }
    email.split('@').next().is_some_and(|local| local.contains('+'))
}

enum FreeCategory {
    Regular,
    Temp,
    Aliased,
    Deleted,
    Visitor,
    Excluded,
}

/// Resolve one free user's category, in documented priority order.
fn categorize_user(user_id: u64, identities: &IdentityBundle) -> FreeCategory {
    let ledger = identities.ledger.get(&user_id);

    // 1. Visitors never have identity rows; the ledger marker is decisive.
    if ledger.is_some_and(|l| l.account_source == AccountSource::Visitor) {
        return FreeCategory::Visitor;
    }

    // 2. Live identity with a resolvable email.
    if let Some(identity) = identities.live.get(&user_id) {
        if let Some(email) = identity.resolved_email() {
            if is_temp_email(email) {
                return FreeCategory::Temp;
            }
            if is_aliased_email(email) {
                return FreeCategory::Aliased;
            }
            return FreeCategory::Regular;
        }
        // Live row without any email candidate falls through to exclusion;
        // it is neither deleted nor a visitor.
        return FreeCategory::Excluded;
    }

    // 3. Registered in the ledger but missing from the live identity table:
    //    a deleted account. Its historical email comes from the audit log,
    //    and a recovered alias still counts as aliased, not deleted.
    if ledger.is_some_and(|l| l.account_source == AccountSource::Registered) {
        let recovered = identities
            .deleted
            .get(&user_id)
            .and_then(|entry| entry.resolved_email());
        if recovered.is_some_and(is_aliased_email) {
            return FreeCategory::Aliased;
        }
        return FreeCategory::Deleted;
    }

    FreeCategory::Excluded
}

pub struct CostCategorizer {
    energy_to_usd: f64,
}

impl CostCategorizer {
    pub fn new(energy_to_usd: f64) -> Self {
        Self { energy_to_usd }
    }

    /// Bucket the given day's events by membership and user provenance.
    /// Percent-of-total is the caller's job.
    pub fn categorize(&self, events: &[UsageEvent], identities: &IdentityBundle) -> CostReport {
        let mut report = CostReport::default();

        // Free usage is classified per user, so fold events per user first.
        let mut per_user: HashMap<u64, (f64, u64)> = HashMap::new();
        for event in events {
            let cost = event.energy_cost as f64 * self.energy_to_usd;
            match event.membership {
                Membership::Paid => {
                    report.paid_cost += cost;
                    report.paid_task_count += 1;
                }
                Membership::Free => {
                    let entry = per_user.entry(event.user_id).or_default();
                    entry.0 += cost;
                    entry.1 += 1;
                }
            }
        }

        for (user_id, (cost, tasks)) in per_user {
            let bucket = match categorize_user(user_id, identities) {
                FreeCategory::Regular => &mut report.regular_email,
                FreeCategory::Temp => &mut report.temp_email,
                FreeCategory::Aliased => &mut report.aliased_email,
                FreeCategory::Deleted => &mut report.deleted_account,
                FreeCategory::Visitor => &mut report.visitor,
                FreeCategory::Excluded => {
                    report.excluded_user_count += 1;
                    continue;
                }
            };
            bucket.cost += cost;
            bucket.task_count += tasks;
            bucket.user_count += 1;
            report.free_cost += cost;
            report.free_task_count += tasks;
            report.free_user_count += 1;
        }

        if report.excluded_user_count > 0 {
            warn!(
                excluded_users = report.excluded_user_count,
                "Free users without identity or ledger provenance excluded from cost buckets"
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use margin_core::types::{
        DeletionAuditEntry, IdentityRecord, TaskStatus, UserLedgerRow,
    };
    use uuid::Uuid;

    fn event(user_id: u64, membership: Membership, energy: i64) -> UsageEvent {
        UsageEvent {
            id: Uuid::new_v4(),
            user_id,
            bot_id: 1,
            slug_id: "bot-a".into(),
            energy_cost: energy,
            membership,
            status: TaskStatus::Done,
            created_at: Utc::now(),
        }
    }

    fn ledger(user_id: u64, source: AccountSource) -> UserLedgerRow {
        UserLedgerRow {
            user_id,
            account_source: source,
            is_creator: false,
        }
    }

    fn identity(user_id: u64, email: &str) -> IdentityRecord {
        IdentityRecord {
            user_id,
            email: email.into(),
            ..Default::default()
        }
    }

    fn bundle() -> IdentityBundle {
        IdentityBundle::default()
    }

    #[test]
    fn test_paid_events_bypass_categorization() {
        let categorizer = CostCategorizer::new(0.01);
        let report = categorizer.categorize(
            &[event(1, Membership::Paid, 500), event(1, Membership::Paid, 300)],
            &bundle(),
        );
        assert_eq!(report.paid_cost, 8.0);
        assert_eq!(report.paid_task_count, 2);
        assert_eq!(report.free_cost, 0.0);
    }

    #[test]
    fn test_email_buckets() {
        let mut identities = bundle();
        identities.ledger.insert(1, ledger(1, AccountSource::Registered));
        identities.ledger.insert(2, ledger(2, AccountSource::Registered));
        identities.ledger.insert(3, ledger(3, AccountSource::Registered));
        identities.live.insert(1, identity(1, "a@yopmail.com"));
        identities.live.insert(2, identity(2, "b+promo@gmail.com"));
        identities.live.insert(3, identity(3, "c@example.com"));

        let categorizer = CostCategorizer::new(0.01);
        let report = categorizer.categorize(
            &[
                event(1, Membership::Free, 100),
                event(2, Membership::Free, 200),
                event(3, Membership::Free, 300),
            ],
            &identities,
        );
        assert_eq!(report.temp_email.cost, 1.0);
        assert_eq!(report.aliased_email.cost, 2.0);
        assert_eq!(report.regular_email.cost, 3.0);
        assert_eq!(report.free_cost, 6.0);
        assert_eq!(report.free_user_count, 3);
    }

    #[test]
    fn test_email_candidate_priority_order() {
        // Primary empty, google set: google wins over apple.
        let record = IdentityRecord {
            user_id: 1,
            email: String::new(),
            google_email: "g@gmail.com".into(),
            apple_email: "a@icloud.com".into(),
        };
        assert_eq!(record.resolved_email(), Some("g@gmail.com"));
    }

    #[test]
    fn test_visitor_bucket() {
        let mut identities = bundle();
        identities.ledger.insert(9, ledger(9, AccountSource::Visitor));

        let categorizer = CostCategorizer::new(0.01);
        let report =
            categorizer.categorize(&[event(9, Membership::Free, 400)], &identities);
        assert_eq!(report.visitor.cost, 4.0);
        assert_eq!(report.visitor.user_count, 1);
    }

    #[test]
    fn test_deleted_account_recovered_from_audit_log() {
        let mut identities = bundle();
        identities.ledger.insert(5, ledger(5, AccountSource::Registered));
        identities.deleted.insert(
            5,
            DeletionAuditEntry {
                user_id: 5,
                email: "gone@example.com".into(),
                ..Default::default()
            },
        );

        let categorizer = CostCategorizer::new(0.01);
        let report =
            categorizer.categorize(&[event(5, Membership::Free, 250)], &identities);
        assert_eq!(report.deleted_account.cost, 2.5);
    }

    #[test]
    fn test_recovered_alias_counts_as_aliased_not_deleted() {
        let mut identities = bundle();
        identities.ledger.insert(5, ledger(5, AccountSource::Registered));
        identities.deleted.insert(
            5,
            DeletionAuditEntry {
                user_id: 5,
                email: "gone+x@gmail.com".into(),
                ..Default::default()
            },
        );

        let categorizer = CostCategorizer::new(0.01);
        let report =
            categorizer.categorize(&[event(5, Membership::Free, 250)], &identities);
        assert_eq!(report.aliased_email.cost, 2.5);
        assert_eq!(report.deleted_account.cost, 0.0);
    }

    /// A free user with neither identity nor recognized ledger provenance
    /// lands in no bucket. Documented limitation, preserved as-is.
    #[test]
    fn test_unresolvable_user_silently_excluded() {
        let categorizer = CostCategorizer::new(0.01);
        let report = categorizer.categorize(&[event(77, Membership::Free, 500)], &bundle());
        assert_eq!(report.free_cost, 0.0);
        assert_eq!(report.excluded_user_count, 1);
        assert_eq!(report.total_cost(), 0.0);
    }

    #[test]
    fn test_bucket_sums_equal_free_cost() {
        let mut identities = bundle();
        identities.ledger.insert(1, ledger(1, AccountSource::Registered));
        identities.ledger.insert(2, ledger(2, AccountSource::Visitor));
        identities.live.insert(1, identity(1, "a@example.com"));

        let categorizer = CostCategorizer::new(0.01);
        let report = categorizer.categorize(
            &[
                event(1, Membership::Free, 100),
                event(2, Membership::Free, 200),
                event(3, Membership::Paid, 300),
            ],
            &identities,
        );
        let bucket_sum = report.regular_email.cost
            + report.temp_email.cost
            + report.aliased_email.cost
            + report.deleted_account.cost
            + report.visitor.cost;
        assert!((bucket_sum - report.free_cost).abs() < 1e-9);
        assert!((report.total_cost() - (report.paid_cost + report.free_cost)).abs() < 1e-9);
    }
}
