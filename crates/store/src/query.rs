use crate::{CandidateScope, FaceStore, PersonStatus, Record, RecordKind, StoreError};

/// Read-side queries.
impl FaceStore {
    /// Point-in-time copy of the records a matching pass may consider.
    ///
    /// Only records with a non-empty embedding are returned. Missing persons
    /// already marked `Found` are left out unless `include_found` is set.
    /// Order is stable: users first, then missing persons, each by id. The
    /// matcher's tie-break depends on this order.
    pub fn load_snapshot(&self, scope: CandidateScope) -> Result<Vec<Record>, StoreError> {
        let include_found = self.cfg.include_found;
        let mut users = Vec::new();
        let mut missing = Vec::new();

        self.backend.scan(&mut |data: &[u8]| {
            let record = self.decode_record(data)?;
            if record.usable_embedding().is_none() || !scope.admits(&record.kind) {
                return Ok(());
            }
            match record.kind {
                RecordKind::User => users.push(record),
                RecordKind::MissingPerson {
                    status: PersonStatus::Found,
                } if !include_found => {}
                RecordKind::MissingPerson { .. } => missing.push(record),
            }
            Ok(())
        })?;

        users.append(&mut missing);
        Ok(users)
    }

    /// Missing-person records, newest first, optionally filtered by status.
    /// Records without embeddings are included.
    pub fn list_missing_persons(
        &self,
        status: Option<PersonStatus>,
    ) -> Result<Vec<Record>, StoreError> {
        let mut out = Vec::new();
        self.backend.scan(&mut |data: &[u8]| {
            let record = self.decode_record(data)?;
            if let Some(current) = record.status() {
                if status.is_none_or(|wanted| wanted == current) {
                    out.push(record);
                }
            }
            Ok(())
        })?;

        out.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Embedding, InMemoryBackend, StoreConfig};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn store_with(include_found: bool) -> FaceStore {
        FaceStore::with_backend(
            StoreConfig::default().with_include_found(include_found),
            Arc::new(InMemoryBackend::new()),
        )
    }

    fn seed(store: &FaceStore) {
        store.insert_record(Record::missing_person("mp-b", vec![0.2])).unwrap();
        store.insert_record(Record::user("u-b", vec![0.4])).unwrap();
        store.insert_record(Record::missing_person("mp-a", vec![0.1])).unwrap();
        store.insert_record(Record::user("u-a", vec![0.3])).unwrap();
        store
            .insert_record(Record::new("u-empty", RecordKind::User, Some(Embedding::empty())))
            .unwrap();
        store
            .insert_record(Record::new(
                "mp-none",
                RecordKind::MissingPerson {
                    status: PersonStatus::Missing,
                },
                None,
            ))
            .unwrap();
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn snapshot_orders_users_before_missing_persons() {
        let store = store_with(false);
        seed(&store);
        let snapshot = store.load_snapshot(CandidateScope::All).unwrap();
        assert_eq!(ids(&snapshot), vec!["u-a", "u-b", "mp-a", "mp-b"]);
    }

    #[test]
    fn snapshot_respects_scope() {
        let store = store_with(false);
        seed(&store);
        let users = store.load_snapshot(CandidateScope::UsersOnly).unwrap();
        assert_eq!(ids(&users), vec!["u-a", "u-b"]);
        let missing = store
            .load_snapshot(CandidateScope::MissingPersonsOnly)
            .unwrap();
        assert_eq!(ids(&missing), vec!["mp-a", "mp-b"]);
    }

    #[test]
    fn found_persons_leave_the_snapshot_unless_configured() {
        let store = store_with(false);
        seed(&store);
        store.mark_found("mp-a").unwrap();
        let snapshot = store.load_snapshot(CandidateScope::All).unwrap();
        assert_eq!(ids(&snapshot), vec!["u-a", "u-b", "mp-b"]);

        let store = store_with(true);
        seed(&store);
        store.mark_found("mp-a").unwrap();
        let snapshot = store.load_snapshot(CandidateScope::All).unwrap();
        assert_eq!(ids(&snapshot), vec!["u-a", "u-b", "mp-a", "mp-b"]);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let store = store_with(true);
        seed(&store);
        let before = store.load_snapshot(CandidateScope::All).unwrap();
        store.mark_found("mp-b").unwrap();
        let mp_b = before.iter().find(|r| r.id == "mp-b").unwrap();
        assert_eq!(mp_b.status(), Some(PersonStatus::Missing));
    }

    #[test]
    fn missing_persons_newest_first_with_filter() {
        let store = store_with(false);
        let now = Utc::now();
        store
            .insert_record(
                Record::missing_person("old", vec![0.1]).with_created_at(now - Duration::hours(2)),
            )
            .unwrap();
        store
            .insert_record(Record::missing_person("new", vec![0.1]).with_created_at(now))
            .unwrap();
        store.insert_record(Record::user("u", vec![0.1])).unwrap();
        store.mark_found("old").unwrap();

        let all = store.list_missing_persons(None).unwrap();
        assert_eq!(ids(&all), vec!["new", "old"]);

        let found = store.list_missing_persons(Some(PersonStatus::Found)).unwrap();
        assert_eq!(ids(&found), vec!["old"]);

        let missing = store
            .list_missing_persons(Some(PersonStatus::Missing))
            .unwrap();
        assert_eq!(ids(&missing), vec!["new"]);
    }
}
