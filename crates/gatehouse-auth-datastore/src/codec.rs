//! Entity codec and lazy schema migration.
//!
//! Every persisted record type declares an explicit field table mapping
//! document properties to struct fields, a current schema version and an
//! ordered list of migration steps. [`load`] decodes properties through the
//! table and upgrades old versions in memory; [`to_entity`] stamps the
//! current version and encodes the record back into properties.

use gatehouse_storage::{Entity, Key, Property, Value};
use time::OffsetDateTime;
use tracing::warn;

/// Property carrying the schema version of a stored record.
pub(crate) const VERSION_PROPERTY: &str = "v";

/// Separator of string lists flattened into a single property.
pub(crate) const LIST_SEPARATOR: &str = "|";

/// Errors raised while decoding or encoding records.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The stored version is below 1 or above what this build knows.
    #[error("{record}: got unexpected version {found} when loading entity (current is {current})")]
    UnexpectedVersion {
        record: &'static str,
        found: i64,
        current: i64,
    },

    /// The migration chain has a gap; this is a programming error.
    #[error("{record}: no migration registered from version {from}")]
    MissingMigration { record: &'static str, from: i64 },

    /// The record cannot be stored as is.
    #[error("{record}: {message}")]
    Invalid {
        record: &'static str,
        message: String,
    },
}

// ============================================================================
// Field tables
// ============================================================================

/// How a property maps onto a record field.
pub(crate) enum Access<R> {
    Text(fn(&mut R) -> &mut String),
    /// String list stored as one `|`-joined string.
    Joined(fn(&mut R) -> &mut Vec<String>),
    /// String list stored as an array property (each element indexed).
    List(fn(&mut R) -> &mut Vec<String>),
    Flag(fn(&mut R) -> &mut bool),
    Integer(fn(&mut R) -> &mut i64),
    Time(fn(&mut R) -> &mut Option<OffsetDateTime>),
    Blob(fn(&mut R) -> &mut Vec<u8>),
}

/// One row of a record's field table.
pub(crate) struct Field<R> {
    pub property: &'static str,
    pub indexed: bool,
    pub access: Access<R>,
}

impl<R> Field<R> {
    const fn indexed(property: &'static str, access: Access<R>) -> Self {
        Self {
            property,
            indexed: true,
            access,
        }
    }

    pub(crate) const fn text(property: &'static str, slot: fn(&mut R) -> &mut String) -> Self {
        Self::indexed(property, Access::Text(slot))
    }

    pub(crate) const fn joined(property: &'static str, slot: fn(&mut R) -> &mut Vec<String>) -> Self {
        Self::indexed(property, Access::Joined(slot))
    }

    pub(crate) const fn list(property: &'static str, slot: fn(&mut R) -> &mut Vec<String>) -> Self {
        Self::indexed(property, Access::List(slot))
    }

    pub(crate) const fn flag(property: &'static str, slot: fn(&mut R) -> &mut bool) -> Self {
        Self::indexed(property, Access::Flag(slot))
    }

    pub(crate) const fn integer(property: &'static str, slot: fn(&mut R) -> &mut i64) -> Self {
        Self::indexed(property, Access::Integer(slot))
    }

    pub(crate) const fn time(
        property: &'static str,
        slot: fn(&mut R) -> &mut Option<OffsetDateTime>,
    ) -> Self {
        Self::indexed(property, Access::Time(slot))
    }

    pub(crate) const fn blob(property: &'static str, slot: fn(&mut R) -> &mut Vec<u8>) -> Self {
        Self::indexed(property, Access::Blob(slot))
    }

    /// Excludes the property from indexes.
    pub(crate) const fn unindexed(self) -> Self {
        Self {
            property: self.property,
            indexed: false,
            access: self.access,
        }
    }

    fn encode(&self, record: &mut R) -> Property {
        let value = match &self.access {
            Access::Text(slot) => Value::String(slot(record).clone()),
            Access::Joined(slot) => Value::String(slot(record).join(LIST_SEPARATOR)),
            Access::List(slot) => {
                Value::Array(slot(record).iter().cloned().map(Value::String).collect())
            }
            Access::Flag(slot) => Value::Bool(*slot(record)),
            Access::Integer(slot) => Value::Int(*slot(record)),
            Access::Time(slot) => match *slot(record) {
                Some(t) => Value::Timestamp(truncate_to_micros(t)),
                None => Value::Null,
            },
            Access::Blob(slot) => Value::Bytes(slot(record).clone()),
        };
        Property {
            name: self.property.to_string(),
            value,
            indexed: self.indexed,
        }
    }

    /// Writes `value` into the record. Returns `false` on a type mismatch.
    fn decode(&self, record: &mut R, value: &Value) -> bool {
        match (&self.access, value) {
            (_, Value::Null) => {}
            (Access::Text(slot), Value::String(s)) => *slot(record) = s.clone(),
            (Access::Joined(slot), Value::String(s)) => *slot(record) = split_joined(s),
            (Access::List(slot), Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) => out.push(s.to_string()),
                        None => return false,
                    }
                }
                *slot(record) = out;
            }
            (Access::Flag(slot), Value::Bool(b)) => *slot(record) = *b,
            (Access::Integer(slot), Value::Int(i)) => *slot(record) = *i,
            (Access::Time(slot), Value::Timestamp(t)) => *slot(record) = Some(*t),
            (Access::Blob(slot), Value::Bytes(b)) => *slot(record) = b.clone(),
            _ => return false,
        }
        true
    }
}

/// Properties of a stored entity that no field claims.
///
/// Migrations read removed properties from here.
#[derive(Debug, Default)]
pub(crate) struct Residual {
    properties: Vec<Property>,
}

impl Residual {
    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Boolean residual property; absent or non-boolean reads as `false`.
    pub(crate) fn flag(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Upgrade step from version `from` to `from + 1`.
pub(crate) struct Migration<R> {
    pub from: i64,
    pub apply: fn(&mut R, &Residual),
}

/// A record type persisted through the codec.
pub(crate) trait Record: Default + Sized + 'static {
    /// Human-readable record name used in errors and logs.
    const NAME: &'static str;
    const CURRENT_VERSION: i64;
    const FIELDS: &'static [Field<Self>];
    const MIGRATIONS: &'static [Migration<Self>];

    /// Copies identity held in the key (usually its name) into the record.
    fn load_key(&mut self, key: &Key);

    /// Fills defaults and validates before encoding.
    fn before_save(&mut self) -> Result<(), CodecError> {
        Ok(())
    }
}

/// A decoded record and whether migration changed it.
#[derive(Debug)]
pub(crate) struct Loaded<R> {
    pub record: R,
    /// Set when the in-memory record is newer than the stored one and
    /// should be written back.
    pub pending_upgrade: bool,
}

// ============================================================================
// Load / save
// ============================================================================

/// Decodes an entity and migrates it to the current version.
pub(crate) fn load<R: Record>(entity: &Entity) -> Result<Loaded<R>, CodecError> {
    let mut record = R::default();
    record.load_key(&entity.key);

    let mut stored_version = 0;
    let mut residual = Residual::default();

    for property in &entity.properties {
        if property.name == VERSION_PROPERTY {
            stored_version = property.value.as_int().unwrap_or(0);
            continue;
        }
        match R::FIELDS.iter().find(|f| f.property == property.name) {
            Some(field) => {
                if !field.decode(&mut record, &property.value) {
                    warn!(
                        record = R::NAME,
                        key = %entity.key,
                        property = %property.name,
                        found = property.value.type_name(),
                        "skipping property with unexpected type"
                    );
                }
            }
            None => residual.properties.push(property.clone()),
        }
    }

    let pending_upgrade = migrate(&mut record, stored_version, &residual)?;
    Ok(Loaded {
        record,
        pending_upgrade,
    })
}

/// Applies migration steps until the record reaches the current version.
///
/// Returns `true` if any step ran.
pub(crate) fn migrate<R: Record>(
    record: &mut R,
    stored_version: i64,
    residual: &Residual,
) -> Result<bool, CodecError> {
    if stored_version < 1 || stored_version > R::CURRENT_VERSION {
        return Err(CodecError::UnexpectedVersion {
            record: R::NAME,
            found: stored_version,
            current: R::CURRENT_VERSION,
        });
    }

    let mut version = stored_version;
    while version < R::CURRENT_VERSION {
        let step = R::MIGRATIONS
            .iter()
            .find(|m| m.from == version)
            .ok_or(CodecError::MissingMigration {
                record: R::NAME,
                from: version,
            })?;
        (step.apply)(record, residual);
        version += 1;
    }
    Ok(stored_version != R::CURRENT_VERSION)
}

/// Encodes a record under `key`, stamping the current version.
pub(crate) fn to_entity<R: Record>(key: Key, record: &mut R) -> Result<Entity, CodecError> {
    record.before_save()?;

    let mut properties = Vec::with_capacity(R::FIELDS.len() + 1);
    for field in R::FIELDS {
        properties.push(field.encode(record));
    }
    properties.push(Property::new(VERSION_PROPERTY, R::CURRENT_VERSION));

    Ok(Entity::new(key, properties))
}

/// Splits a `|`-joined list. The empty string is the empty list.
pub(crate) fn split_joined(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(LIST_SEPARATOR).map(str::to_string).collect()
}

/// Drops sub-microsecond precision, which the store does not keep.
pub(crate) fn truncate_to_micros(t: OffsetDateTime) -> OffsetDateTime {
    t.replace_nanosecond(t.nanosecond() / 1_000 * 1_000)
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three versions: v1→v2 clears `legacy_count`, v2→v3 reads the removed
    /// `old` property.
    #[derive(Debug, Default, PartialEq)]
    struct Widget {
        id: String,
        label: String,
        tags: Vec<String>,
        members: Vec<String>,
        enabled: bool,
        legacy_count: i64,
        seen_at: Option<OffsetDateTime>,
        blob: Vec<u8>,
    }

    impl Record for Widget {
        const NAME: &'static str = "widget";
        const CURRENT_VERSION: i64 = 3;
        const FIELDS: &'static [Field<Self>] = &[
            Field::<Self>::text("lbl", |w| &mut w.label),
            Field::<Self>::joined("tags", |w| &mut w.tags),
            Field::<Self>::list("m", |w| &mut w.members),
            Field::<Self>::flag("on", |w| &mut w.enabled),
            Field::<Self>::integer("cnt", |w| &mut w.legacy_count),
            Field::<Self>::time("seen", |w| &mut w.seen_at),
            Field::<Self>::blob("b", |w| &mut w.blob).unindexed(),
        ];
        const MIGRATIONS: &'static [Migration<Self>] = &[
            Migration {
                from: 1,
                apply: |w, _| w.legacy_count = 0,
            },
            Migration {
                from: 2,
                apply: |w, residual| {
                    if residual.flag("old") {
                        w.enabled = true;
                    }
                },
            },
        ];

        fn load_key(&mut self, key: &Key) {
            self.id = key.name().to_string();
        }
    }

    /// Current version 3 but no step from 2.
    #[derive(Debug, Default)]
    struct Gappy;

    impl Record for Gappy {
        const NAME: &'static str = "gappy";
        const CURRENT_VERSION: i64 = 3;
        const FIELDS: &'static [Field<Self>] = &[];
        const MIGRATIONS: &'static [Migration<Self>] = &[Migration {
            from: 1,
            apply: |_, _| {},
        }];

        fn load_key(&mut self, _key: &Key) {}
    }

    fn key() -> Key {
        Key::name_key("Widget", "w1", None)
    }

    fn stored(version: i64, mut extra: Vec<Property>) -> Entity {
        extra.push(Property::new(VERSION_PROPERTY, version));
        Entity::new(key(), extra)
    }

    #[test]
    fn test_save_then_load_current_version() {
        let mut widget = Widget {
            label: "gear".into(),
            tags: vec!["a".into(), "b".into()],
            members: vec!["alice".into()],
            enabled: true,
            legacy_count: 7,
            seen_at: Some(OffsetDateTime::UNIX_EPOCH),
            blob: vec![1, 2, 3],
            ..Widget::default()
        };
        let entity = to_entity(key(), &mut widget).unwrap();

        assert_eq!(entity.get("tags"), Some(&Value::from("a|b")));
        assert_eq!(entity.get(VERSION_PROPERTY), Some(&Value::Int(3)));
        assert!(!entity.property("b").unwrap().indexed);

        let loaded = load::<Widget>(&entity).unwrap();
        assert!(!loaded.pending_upgrade);
        assert_eq!(loaded.record.id, "w1");
        assert_eq!(loaded.record.label, "gear");
        assert_eq!(loaded.record.tags, vec!["a", "b"]);
        assert_eq!(loaded.record.members, vec!["alice"]);
        assert_eq!(loaded.record.legacy_count, 7);
        assert_eq!(loaded.record.blob, vec![1, 2, 3]);
    }

    #[test]
    fn test_migration_chain_from_v1() {
        let entity = stored(
            1,
            vec![Property::new("cnt", 9_i64), Property::new("old", true)],
        );
        let loaded = load::<Widget>(&entity).unwrap();

        assert!(loaded.pending_upgrade);
        assert_eq!(loaded.record.legacy_count, 0);
        assert!(loaded.record.enabled);

        let mut record = loaded.record;
        let rewritten = to_entity(key(), &mut record).unwrap();
        assert!(rewritten.get("old").is_none());
        assert!(!load::<Widget>(&rewritten).unwrap().pending_upgrade);
    }

    #[test]
    fn test_migration_reads_residual_only_when_set() {
        let entity = stored(2, vec![Property::new("cnt", 4_i64)]);
        let loaded = load::<Widget>(&entity).unwrap();

        assert!(loaded.pending_upgrade);
        assert_eq!(loaded.record.legacy_count, 4);
        assert!(!loaded.record.enabled);
    }

    #[test]
    fn test_unexpected_versions() {
        for version in [0, 4, -1] {
            let err = load::<Widget>(&stored(version, Vec::new())).unwrap_err();
            assert!(matches!(err, CodecError::UnexpectedVersion { found, .. } if found == version));
        }

        let missing = Entity::new(key(), Vec::new());
        assert!(matches!(
            load::<Widget>(&missing).unwrap_err(),
            CodecError::UnexpectedVersion { found: 0, .. }
        ));
    }

    #[test]
    fn test_gap_in_chain_fails_loudly() {
        let entity = Entity::new(key(), vec![Property::new(VERSION_PROPERTY, 2_i64)]);
        assert!(matches!(
            load::<Gappy>(&entity).unwrap_err(),
            CodecError::MissingMigration { from: 2, .. }
        ));
    }

    #[test]
    fn test_type_mismatch_is_skipped() {
        let entity = stored(3, vec![Property::new("lbl", 12_i64), Property::new("on", true)]);
        let loaded = load::<Widget>(&entity).unwrap();

        assert_eq!(loaded.record.label, "");
        assert!(loaded.record.enabled);
    }

    #[test]
    fn test_timestamps_truncated_to_micros() {
        let precise = OffsetDateTime::UNIX_EPOCH
            .replace_nanosecond(123_456_789)
            .unwrap();
        let mut widget = Widget {
            seen_at: Some(precise),
            ..Widget::default()
        };
        let entity = to_entity(key(), &mut widget).unwrap();
        let seen = entity.get("seen").and_then(Value::as_timestamp).unwrap();
        assert_eq!(seen.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_split_joined() {
        assert!(split_joined("").is_empty());
        assert_eq!(split_joined("openid|offline"), vec!["openid", "offline"]);
    }
}
