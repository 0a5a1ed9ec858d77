//! Main record generator.

use chrono::{DateTime, Utc};
use keyspread_core::{BenchmarkRecord, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::generators::{author, id};
use crate::shard::ShardAssigner;

/// Error type for generator configuration.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Shard count must be positive, got {0}")]
    InvalidShardCount(u32),
}

/// How natural ids are generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdScheme {
    /// Random UUID v4. Spreads evenly under any key strategy.
    #[default]
    Uuid,
    /// ULID. Time-ordered, so natural keys hotspot on the newest range.
    Ulid,
}

/// Generator that produces synthetic records.
///
/// Random fields come from a seeded RNG; timestamps come from the caller
/// (`next_record_at`) or the wall clock (`next_record`).
pub struct RecordGenerator {
    rng: StdRng,
    id_scheme: IdScheme,
    generated: u64,
}

impl RecordGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            id_scheme: IdScheme::default(),
            generated: 0,
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            id_scheme: IdScheme::default(),
            generated: 0,
        }
    }

    /// Generator for one worker of a seeded run.
    ///
    /// Each worker gets its own stream so ids never collide across workers.
    pub fn for_worker(seed: u64, worker: u64) -> Self {
        Self::new(seed.wrapping_add(worker.wrapping_mul(0x9E3779B97F4A7C15)))
    }

    pub fn with_id_scheme(mut self, id_scheme: IdScheme) -> Self {
        self.id_scheme = id_scheme;
        self
    }

    pub fn id_scheme(&self) -> IdScheme {
        self.id_scheme
    }

    /// Number of records generated so far.
    pub fn generated(&self) -> u64 {
        self.generated
    }

    /// Fresh natural id under the configured scheme.
    pub fn next_id(&mut self, now: DateTime<Utc>) -> String {
        match self.id_scheme {
            IdScheme::Uuid => id::generate_uuid_v4(&mut self.rng).to_string(),
            IdScheme::Ulid => {
                let ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
                id::generate_ulid(&mut self.rng, ms).to_string()
            }
        }
    }

    pub fn next_record(&mut self) -> Record {
        self.next_record_at(Utc::now())
    }

    pub fn next_record_at(&mut self, now: DateTime<Utc>) -> Record {
        let id = self.next_id(now);
        let author = author::pick_author(&mut self.rng).to_string();
        let content = id::generate_uuid_v4(&mut self.rng).to_string();
        let favorites = author::pick_favorites(&mut self.rng);
        let sort_weight = self.rng.gen_range(0..i64::MAX);
        self.generated += 1;

        Record {
            id,
            author,
            content,
            count: 0,
            favorites,
            sort_weight,
            created_at: now,
            updated_at: now,
            committed_at: None,
        }
    }

    /// Record tagged with the shard of its generation time.
    pub fn next_benchmark_record(&mut self, shards: &ShardAssigner) -> BenchmarkRecord {
        let now = Utc::now();
        BenchmarkRecord {
            shard: shards.assign(now),
            record: self.next_record_at(now),
        }
    }

    /// Lazily generate `count` records.
    pub fn records(&mut self, count: u64) -> RecordIterator<'_> {
        RecordIterator {
            generator: self,
            remaining: count,
        }
    }
}

/// Iterator that lazily generates records.
pub struct RecordIterator<'a> {
    generator: &'a mut RecordGenerator,
    remaining: u64,
}

impl Iterator for RecordIterator<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.generator.next_record())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RecordIterator<'_> {}
