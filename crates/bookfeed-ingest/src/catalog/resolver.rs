// Contributor / Publisher Resolution
//
// Collects every contributor and publisher name referenced by a feed file,
// looks them all up in bulk, and creates the missing ones in bulk, so the
// per-record upserts never have to query for names.

use crate::error::Result;
use crate::onix::CandidateBook;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

// ============================================================================
// Resolved Entities
// ============================================================================

/// Name -> id maps for one import run
#[derive(Debug, Clone, Default)]
pub struct ResolvedEntities {
    contributors: HashMap<String, i64>,
    publishers: HashMap<String, i64>,
    created_contributors: usize,
    created_publishers: usize,
}

impl ResolvedEntities {
    /// Contributor id by exact name
    pub fn contributor_id(&self, name: &str) -> Option<i64> {
        self.contributors.get(name).copied()
    }

    /// Publisher id for a name as it appears in the feed (surrounding whitespace ignored)
    pub fn publisher_id(&self, name: &str) -> Option<i64> {
        self.publishers.get(name.trim()).copied()
    }

    pub fn contributors(&self) -> &HashMap<String, i64> {
        &self.contributors
    }

    pub fn publishers(&self) -> &HashMap<String, i64> {
        &self.publishers
    }

    pub fn created_contributors(&self) -> usize {
        self.created_contributors
    }

    pub fn created_publishers(&self) -> usize {
        self.created_publishers
    }
}

/// A contributor that has to be created, with the first biography the feed offers
#[derive(Debug, Clone, Copy)]
struct NewContributor<'a> {
    name: &'a str,
    biography: Option<&'a str>,
}

// ============================================================================
// Resolver
// ============================================================================

pub struct EntityResolver {
    db: SqlitePool,
    chunk_size: usize,
}

impl EntityResolver {
    pub fn new(db: SqlitePool, chunk_size: usize) -> Self {
        Self {
            db,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Map every contributor and publisher in `candidates` to a database id.
    ///
    /// Runs in one transaction: either every missing name is created or none is.
    pub async fn resolve(&self, candidates: &[CandidateBook]) -> Result<ResolvedEntities> {
        let contributors = distinct_contributors(candidates);
        let publishers = distinct_publishers(candidates);

        debug!(
            contributors = contributors.len(),
            publishers = publishers.len(),
            "Resolving distinct names"
        );

        let mut tx = self.db.begin().await?;
        let mut resolved = ResolvedEntities::default();

        // Contributors first, then publishers
        let names: Vec<&str> = contributors.iter().map(|c| c.name).collect();
        resolved.contributors = self.lookup_ids(&mut tx, "contributors", &names).await?;

        let missing: Vec<NewContributor<'_>> = contributors
            .iter()
            .filter(|c| !resolved.contributors.contains_key(c.name))
            .copied()
            .collect();
        let created = self.insert_contributors(&mut tx, &missing).await?;
        resolved.created_contributors = created.len();
        resolved.contributors.extend(created);

        resolved.publishers = self.lookup_ids(&mut tx, "publishers", &publishers).await?;

        let missing: Vec<&str> = publishers
            .iter()
            .filter(|name| !resolved.publishers.contains_key(**name))
            .copied()
            .collect();
        let created = self.insert_publishers(&mut tx, &missing).await?;
        resolved.created_publishers = created.len();
        resolved.publishers.extend(created);

        tx.commit().await?;

        info!(
            contributors = resolved.contributors.len(),
            new_contributors = resolved.created_contributors,
            publishers = resolved.publishers.len(),
            new_publishers = resolved.created_publishers,
            "Resolved contributors and publishers"
        );

        Ok(resolved)
    }

    /// Existing `name -> id` rows of `table`; the lowest id wins for duplicate names
    async fn lookup_ids(
        &self,
        conn: &mut SqliteConnection,
        table: &'static str,
        names: &[&str],
    ) -> Result<HashMap<String, i64>> {
        let mut ids = HashMap::with_capacity(names.len());

        for chunk in names.chunks(self.chunk_size) {
            let mut query_builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("SELECT id, name FROM {} WHERE name IN (", table));
            let mut separated = query_builder.separated(", ");
            for name in chunk {
                separated.push_bind(*name);
            }
            separated.push_unseparated(") ORDER BY id");

            let rows: Vec<(i64, String)> = query_builder
                .build_query_as()
                .fetch_all(&mut *conn)
                .await?;

            for (id, name) in rows {
                ids.entry(name).or_insert(id);
            }
        }

        Ok(ids)
    }

    async fn insert_contributors(
        &self,
        conn: &mut SqliteConnection,
        contributors: &[NewContributor<'_>],
    ) -> Result<Vec<(String, i64)>> {
        let mut created = Vec::with_capacity(contributors.len());
        let now = Utc::now();

        for chunk in contributors.chunks(self.chunk_size) {
            let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO contributors (name, biography, created_at, updated_at) ",
            );
            query_builder.push_values(chunk, |mut b, contributor| {
                b.push_bind(contributor.name)
                    .push_bind(contributor.biography)
                    .push_bind(now)
                    .push_bind(now);
            });
            query_builder.push(" RETURNING id, name");

            let rows: Vec<(i64, String)> = query_builder
                .build_query_as()
                .fetch_all(&mut *conn)
                .await?;
            created.extend(rows.into_iter().map(|(id, name)| (name, id)));
        }

        Ok(created)
    }

    async fn insert_publishers(
        &self,
        conn: &mut SqliteConnection,
        names: &[&str],
    ) -> Result<Vec<(String, i64)>> {
        let mut created = Vec::with_capacity(names.len());
        let now = Utc::now();

        for chunk in names.chunks(self.chunk_size) {
            let mut query_builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO publishers (name, created_at, updated_at) ");
            query_builder.push_values(chunk, |mut b, name| {
                b.push_bind(*name).push_bind(now).push_bind(now);
            });
            query_builder.push(" RETURNING id, name");

            let rows: Vec<(i64, String)> = query_builder
                .build_query_as()
                .fetch_all(&mut *conn)
                .await?;
            created.extend(rows.into_iter().map(|(id, name)| (name, id)));
        }

        Ok(created)
    }
}

// ============================================================================
// Name Collection
// ============================================================================

/// Distinct contributor names in first-seen order, each with its first non-empty biography
fn distinct_contributors(candidates: &[CandidateBook]) -> Vec<NewContributor<'_>> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut contributors: Vec<NewContributor<'_>> = Vec::new();

    for contributor in candidates.iter().flat_map(|book| &book.contributors) {
        if contributor.name.is_empty() {
            continue;
        }
        let biography = contributor
            .biography
            .as_deref()
            .filter(|bio| !bio.trim().is_empty());

        match positions.get(contributor.name.as_str()) {
            Some(&index) => {
                let seen = &mut contributors[index];
                if seen.biography.is_none() {
                    seen.biography = biography;
                }
            },
            None => {
                positions.insert(&contributor.name, contributors.len());
                contributors.push(NewContributor {
                    name: &contributor.name,
                    biography,
                });
            },
        }
    }

    contributors
}

/// Distinct trimmed, non-empty publisher names in first-seen order
fn distinct_publishers(candidates: &[CandidateBook]) -> Vec<&str> {
    let mut seen: HashSet<&str> = HashSet::new();
    candidates
        .iter()
        .filter_map(|book| book.publisher.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty() && seen.insert(*name))
        .collect()
}
