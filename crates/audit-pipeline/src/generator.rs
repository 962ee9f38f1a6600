//! Synthetic entity and audit record generation.

use chrono::{Duration, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::allocator::TimeBucket;
use crate::stage::ColumnValue;

/// Audit row type discriminator, stored as SMALLINT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Create = 1,
    Update = 2,
    Delete = 3,
}

impl AuditKind {
    pub fn smallint(self) -> i16 {
        self as i16
    }
}

/// Display attribution recorded on generated audit rows; `blame_id` carries
/// the audited object's own id.
pub const BLAME_USER: &str = "System User";

/// Column order for audit tables, shared by seeding and migration.
pub const AUDIT_COLUMNS: [&str; 8] = [
    "tenant_id",
    "object_id",
    "type",
    "diffs",
    "transaction_hash",
    "blame_id",
    "blame_user",
    "created_at",
];

/// The closed set of seedable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Course,
    Tenant,
    Enrollment,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Course => "course",
            EntityKind::Tenant => "tenant",
            EntityKind::Enrollment => "enrollment",
        }
    }

    pub fn entity_table(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Course => "courses",
            EntityKind::Tenant => "tenants",
            EntityKind::Enrollment => "course_enrollments",
        }
    }

    pub fn audit_table(&self) -> &'static str {
        match self {
            EntityKind::User => "user_audits",
            EntityKind::Course => "course_audits",
            EntityKind::Tenant => "tenant_audits",
            EntityKind::Enrollment => "course_enrollment_audits",
        }
    }

    pub fn entity_columns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::User => &[
                "id",
                "tenant_id",
                "full_name",
                "email",
                "enabled",
                "created_at",
                "updated_at",
            ],
            EntityKind::Course => &[
                "id",
                "tenant_id",
                "title",
                "description",
                "is_completed",
                "created_at",
                "updated_at",
            ],
            EntityKind::Tenant => &["id", "name", "created_at", "updated_at"],
            EntityKind::Enrollment => &[
                "id",
                "tenant_id",
                "user_id",
                "course_id",
                "enrolled_at",
                "is_completed",
                "created_at",
                "updated_at",
            ],
        }
    }

    /// Synthesize one entity at its creation timestamp. `pools` must be
    /// populated for the enrollment kind.
    fn draft(
        &self,
        rng: &mut StdRng,
        sequence: u64,
        tenant_id: Uuid,
        created_at: NaiveDateTime,
        pools: &EnrollmentPools,
    ) -> EntityDraft {
        let id = Uuid::new_v4();
        match self {
            EntityKind::User => {
                let full_name = format!(
                    "{} {}",
                    FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())],
                    LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())]
                );
                let email = format!("user{}_{:08x}@example.com", sequence, rng.gen::<u32>());
                let enabled = rng.gen_bool(0.9);

                let mut base = serde_json::Map::new();
                base.insert("full_name".to_string(), json!(full_name));
                base.insert("email".to_string(), json!(email));
                base.insert("enabled".to_string(), json!(enabled));

                EntityDraft {
                    id,
                    audit_tenant: tenant_id,
                    row: vec![
                        ColumnValue::Uuid(id),
                        ColumnValue::Uuid(tenant_id),
                        ColumnValue::Text(full_name),
                        ColumnValue::Text(email),
                        ColumnValue::Bool(enabled),
                        ColumnValue::Timestamp(created_at),
                        ColumnValue::Timestamp(created_at),
                    ],
                    base,
                    mutable_key: "enabled",
                    mutable: MutableSeed::Toggle { initial: enabled },
                }
            }
            EntityKind::Course => {
                let title = format!(
                    "{} {}",
                    COURSE_TOPICS[rng.gen_range(0..COURSE_TOPICS.len())],
                    100 + rng.gen_range(0..900)
                );
                let description = format!("An introduction to {}.", title.to_lowercase());
                let is_completed = rng.gen_bool(0.3);

                let mut base = serde_json::Map::new();
                base.insert("title".to_string(), json!(title));
                base.insert("description".to_string(), json!(description));
                base.insert("is_completed".to_string(), json!(is_completed));

                EntityDraft {
                    id,
                    audit_tenant: tenant_id,
                    row: vec![
                        ColumnValue::Uuid(id),
                        ColumnValue::Uuid(tenant_id),
                        ColumnValue::Text(title.clone()),
                        ColumnValue::Text(description),
                        ColumnValue::Bool(is_completed),
                        ColumnValue::Timestamp(created_at),
                        ColumnValue::Timestamp(created_at),
                    ],
                    base,
                    mutable_key: "title",
                    mutable: MutableSeed::Revision { base: title },
                }
            }
            EntityKind::Tenant => {
                let name = format!(
                    "Tenant {} {}",
                    COMPANY_NAMES[rng.gen_range(0..COMPANY_NAMES.len())],
                    sequence
                );

                let mut base = serde_json::Map::new();
                base.insert("name".to_string(), json!(name));

                // A tenant's audit rows belong to the tenant itself.
                EntityDraft {
                    id,
                    audit_tenant: id,
                    row: vec![
                        ColumnValue::Uuid(id),
                        ColumnValue::Text(name.clone()),
                        ColumnValue::Timestamp(created_at),
                        ColumnValue::Timestamp(created_at),
                    ],
                    base,
                    mutable_key: "name",
                    mutable: MutableSeed::Revision { base: name },
                }
            }
            EntityKind::Enrollment => {
                let user_id = pools.random_user(rng);
                let course_id = pools.random_course(rng);
                let is_completed = rng.gen_bool(0.7);
                let enrolled_at = created_at.date();

                let mut base = serde_json::Map::new();
                base.insert("tenant_id".to_string(), json!(tenant_id.to_string()));
                base.insert("user_id".to_string(), json!(user_id.to_string()));
                base.insert("course_id".to_string(), json!(course_id.to_string()));
                base.insert("enrolled_at".to_string(), json!(enrolled_at.to_string()));
                base.insert("is_completed".to_string(), json!(is_completed));

                EntityDraft {
                    id,
                    audit_tenant: tenant_id,
                    row: vec![
                        ColumnValue::Uuid(id),
                        ColumnValue::Uuid(tenant_id),
                        ColumnValue::Uuid(user_id),
                        ColumnValue::Uuid(course_id),
                        ColumnValue::Date(enrolled_at),
                        ColumnValue::Bool(is_completed),
                        ColumnValue::Timestamp(created_at),
                        ColumnValue::Timestamp(created_at),
                    ],
                    base,
                    mutable_key: "is_completed",
                    mutable: MutableSeed::Toggle {
                        initial: is_completed,
                    },
                }
            }
        }
    }
}

/// Existing user and course ids an enrollment can reference, sampled from
/// the operational store. Both lists must be non-empty before enrollment
/// records are generated.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentPools {
    pub user_ids: Vec<Uuid>,
    pub course_ids: Vec<Uuid>,
}

impl EnrollmentPools {
    fn random_user(&self, rng: &mut StdRng) -> Uuid {
        self.user_ids[rng.gen_range(0..self.user_ids.len())]
    }

    fn random_course(&self, rng: &mut StdRng) -> Uuid {
        self.course_ids[rng.gen_range(0..self.course_ids.len())]
    }
}

const FIRST_NAMES: [&str; 12] = [
    "Ada", "Grace", "Alan", "Edsger", "Barbara", "Donald", "Radia", "Tim", "Margaret", "Linus",
    "Frances", "Dennis",
];

const LAST_NAMES: [&str; 12] = [
    "Lovelace", "Hopper", "Turing", "Dijkstra", "Liskov", "Knuth", "Perlman", "Berners-Lee",
    "Hamilton", "Torvalds", "Allen", "Ritchie",
];

const COMPANY_NAMES: [&str; 8] = [
    "Acme", "Globex", "Initech", "Umbrella", "Stark", "Wayne", "Wonka", "Tyrell",
];

const COURSE_TOPICS: [&str; 8] = [
    "Algebra",
    "Statistics",
    "Chemistry",
    "Databases",
    "Networking",
    "Compilers",
    "Economics",
    "Linguistics",
];

/// The value a mutable field takes at a given version. Version 0 is the
/// created state; each UPDATE advances the version by one, so consecutive
/// audit records chain (`old` of version v equals `new` of version v-1).
#[derive(Debug, Clone)]
enum MutableSeed {
    Toggle { initial: bool },
    Revision { base: String },
}

impl MutableSeed {
    fn value_at(&self, version: u32) -> serde_json::Value {
        match self {
            MutableSeed::Toggle { initial } => json!(initial ^ (version % 2 == 1)),
            MutableSeed::Revision { base } => {
                if version == 0 {
                    json!(base)
                } else {
                    json!(format!("{} (rev {})", base, version + 1))
                }
            }
        }
    }
}

struct EntityDraft {
    id: Uuid,
    /// Tenant recorded on the audit rows. The tenant kind audits itself,
    /// every other kind audits under the requesting tenant.
    audit_tenant: Uuid,
    row: Vec<ColumnValue>,
    base: serde_json::Map<String, serde_json::Value>,
    mutable_key: &'static str,
    mutable: MutableSeed,
}

/// One generated entity together with its audit trail.
#[derive(Debug)]
pub struct SeedRecord {
    pub entity_id: Uuid,
    /// Row for the entity table, in `entity_columns()` order.
    pub entity_row: Vec<ColumnValue>,
    /// Rows for the audit table, in [`AUDIT_COLUMNS`] order: one CREATE
    /// followed by the configured number of UPDATEs.
    pub audit_rows: Vec<Vec<ColumnValue>>,
}

/// Lazy, finite stream of seed records for one time bucket.
///
/// Not restartable; each `next()` draws fresh random state.
pub struct RecordStream {
    kind: EntityKind,
    tenant_id: Uuid,
    bucket: TimeBucket,
    update_audits: u32,
    update_interval: Duration,
    pools: EnrollmentPools,
    remaining: u64,
    sequence: u64,
    rng: StdRng,
}

impl RecordStream {
    pub fn new(
        kind: EntityKind,
        tenant_id: Uuid,
        bucket: TimeBucket,
        update_audits: u32,
        update_interval_secs: i64,
    ) -> Self {
        RecordStream {
            kind,
            tenant_id,
            remaining: bucket.count,
            bucket,
            update_audits,
            update_interval: Duration::seconds(update_interval_secs),
            pools: EnrollmentPools::default(),
            sequence: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Attach the sampled id pools enrollment records draw from.
    pub fn with_pools(mut self, pools: EnrollmentPools) -> Self {
        self.pools = pools;
        self
    }

    /// Creation timestamp uniformly distributed over the bucket, whole
    /// seconds only.
    fn random_created_at(&mut self) -> NaiveDateTime {
        let span = (self.bucket.end - self.bucket.start).num_seconds().max(0);
        let offset = self.rng.gen_range(0..=span);
        self.bucket.start + Duration::seconds(offset)
    }

    fn transaction_hash(entity_id: Uuid, index: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(entity_id.as_bytes());
        hasher.update(chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0).to_be_bytes());
        hasher.update(index.to_be_bytes());
        let digest = format!("{:x}", hasher.finalize());
        if index == 0 {
            format!("{}_create", digest)
        } else {
            format!("{}_update_{}", digest, index)
        }
    }

    fn audit_row(
        audit_tenant: Uuid,
        entity_id: Uuid,
        kind: AuditKind,
        diffs: serde_json::Value,
        index: u32,
        created_at: NaiveDateTime,
    ) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Uuid(audit_tenant),
            ColumnValue::Uuid(entity_id),
            ColumnValue::I16(kind.smallint()),
            ColumnValue::Json(diffs),
            ColumnValue::Text(Self::transaction_hash(entity_id, index)),
            ColumnValue::Text(entity_id.to_string()),
            ColumnValue::Text(BLAME_USER.to_string()),
            ColumnValue::Timestamp(created_at),
        ]
    }
}

impl Iterator for RecordStream {
    type Item = SeedRecord;

    fn next(&mut self) -> Option<SeedRecord> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.sequence += 1;

        let created_at = self.random_created_at();
        let draft = self.kind.draft(
            &mut self.rng,
            self.sequence,
            self.tenant_id,
            created_at,
            &self.pools,
        );

        let mut audit_rows = Vec::with_capacity(1 + self.update_audits as usize);

        // CREATE: old is null, new is the full created state.
        let mut created_state = draft.base.clone();
        let stamp = created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        created_state.insert("created_at".to_string(), json!(stamp));
        created_state.insert("updated_at".to_string(), json!(stamp));
        audit_rows.push(Self::audit_row(
            draft.audit_tenant,
            draft.id,
            AuditKind::Create,
            json!({ "old": null, "new": created_state }),
            0,
            created_at,
        ));

        // UPDATEs: each one's old state equals the previous one's new state.
        for j in 1..=self.update_audits {
            let diffs = json!({
                "old": { draft.mutable_key: draft.mutable.value_at(j - 1) },
                "new": { draft.mutable_key: draft.mutable.value_at(j) },
            });
            let at = created_at + self.update_interval * j as i32;
            audit_rows.push(Self::audit_row(
                draft.audit_tenant,
                draft.id,
                AuditKind::Update,
                diffs,
                j,
                at,
            ));
        }

        Some(SeedRecord {
            entity_id: draft.id,
            entity_row: draft.row,
            audit_rows,
        })
    }
}
