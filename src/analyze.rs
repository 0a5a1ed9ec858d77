//! Offline comparison of key strategies.
//!
//! Generates a warm-up sample, splits the key space into ranges holding
//! equal shares of it (the way a size-splitting store would), then measures
//! where the next batch of writes lands under each strategy. The generation
//! clock advances one millisecond per record so time-ordered ids behave as
//! they would in a long run.

use chrono::{DateTime, Duration, TimeZone, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use keyspread_core::{EncodingError, KeyRanges, KeyStrategy, RangeHistogram, Record};
use keyspread_generator::{IdScheme, RecordGenerator};
use serde::Serialize;

/// Hottest-range share above which a layout is flagged.
const HOTSPOT_SHARE_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub warmup: u64,
    pub writes: u64,
    pub ranges: usize,
    pub seed: u64,
    pub id_scheme: IdScheme,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            warmup: 10_000,
            writes: 10_000,
            ranges: 16,
            seed: 42,
            id_scheme: IdScheme::Uuid,
        }
    }
}

/// Which keys of a strategy a row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    Primary,
    /// The unique index row of the decoupled strategy.
    Index,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyDistribution {
    pub strategy: String,
    pub role: KeyRole,
    pub preserves_natural_order: bool,
    pub counts: Vec<u64>,
    pub chi_square: f64,
    pub hottest_share: f64,
}

impl StrategyDistribution {
    fn from_histogram(strategy: KeyStrategy, role: KeyRole, histogram: &RangeHistogram) -> Self {
        Self {
            strategy: strategy.name().to_string(),
            role,
            preserves_natural_order: strategy.preserves_natural_order(),
            counts: histogram.counts().to_vec(),
            chi_square: histogram.chi_square(),
            hottest_share: histogram.hottest_share(),
        }
    }

    /// Whether the busiest range takes more than twice its fair share.
    pub fn is_hotspot(&self) -> bool {
        let fair = 1.0 / self.counts.len().max(1) as f64;
        self.counts.len() > 1 && self.hottest_share > fair * HOTSPOT_SHARE_FACTOR
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyAnalysis {
    pub warmup: u64,
    pub writes: u64,
    pub ranges: usize,
    pub distributions: Vec<StrategyDistribution>,
}

impl KeyAnalysis {
    pub fn get(&self, strategy: KeyStrategy, role: KeyRole) -> Option<&StrategyDistribution> {
        self.distributions
            .iter()
            .find(|d| d.strategy == strategy.name() && d.role == role)
    }

    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec![
            "Strategy",
            "Keys",
            "Ordered",
            "Chi-square",
            "Hottest range",
            "Verdict",
        ]);

        for dist in &self.distributions {
            let role = match dist.role {
                KeyRole::Primary => "primary",
                KeyRole::Index => "index",
            };
            let verdict = if dist.is_hotspot() {
                Cell::new("HOTSPOT").fg(Color::Red)
            } else {
                Cell::new("spread").fg(Color::Green)
            };
            table.add_row(vec![
                Cell::new(&dist.strategy),
                Cell::new(role),
                Cell::new(if dist.preserves_natural_order { "yes" } else { "no" }),
                Cell::new(format!("{:.1}", dist.chi_square)),
                Cell::new(format!("{:.1}%", dist.hottest_share * 100.0)),
                verdict,
            ]);
        }

        format!(
            "{} writes over {} ranges split from a {} key warm-up\n{table}",
            self.writes, self.ranges, self.warmup
        )
    }
}

/// Keys of `records` under `strategy`, rendered as the store orders them.
fn keys_for(
    strategy: KeyStrategy,
    role: KeyRole,
    records: &[Record],
) -> Result<Vec<String>, EncodingError> {
    let mut keys = Vec::with_capacity(records.len());
    for record in records {
        let derived = strategy.derive(record)?;
        let key = match role {
            KeyRole::Primary => Some(derived.primary),
            KeyRole::Index => derived.secondary,
        };
        if let Some(key) = key {
            keys.push(key.encoded());
        }
    }
    Ok(keys)
}

fn generate(generator: &mut RecordGenerator, clock: &mut DateTime<Utc>, count: u64) -> Vec<Record> {
    (0..count)
        .map(|_| {
            *clock += Duration::milliseconds(1);
            generator.next_record_at(*clock)
        })
        .collect()
}

pub fn analyze(config: &AnalysisConfig) -> Result<KeyAnalysis, EncodingError> {
    let mut generator = RecordGenerator::new(config.seed).with_id_scheme(config.id_scheme);
    let mut clock = Utc
        .timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let warmup = generate(&mut generator, &mut clock, config.warmup);
    let writes = generate(&mut generator, &mut clock, config.writes);

    let mut layouts: Vec<(KeyStrategy, KeyRole)> = KeyStrategy::ALL
        .into_iter()
        .map(|s| (s, KeyRole::Primary))
        .collect();
    layouts.push((KeyStrategy::DecoupledWithUniqueIndex, KeyRole::Index));

    let mut distributions = Vec::with_capacity(layouts.len());
    for (strategy, role) in layouts {
        let sample = keys_for(strategy, role, &warmup)?;
        let mut histogram = RangeHistogram::new(KeyRanges::from_sample(&sample, config.ranges));
        for key in keys_for(strategy, role, &writes)? {
            histogram.record(&key);
        }
        distributions.push(StrategyDistribution::from_histogram(strategy, role, &histogram));
    }

    Ok(KeyAnalysis {
        warmup: config.warmup,
        writes: config.writes,
        ranges: config.ranges,
        distributions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id_scheme: IdScheme) -> AnalysisConfig {
        AnalysisConfig {
            warmup: 4000,
            writes: 4000,
            ranges: 8,
            seed: 7,
            id_scheme,
        }
    }

    #[test]
    fn test_time_ordered_ids_hotspot_natural_keys() {
        let analysis = analyze(&config(IdScheme::Ulid)).unwrap();

        let natural = analysis.get(KeyStrategy::Natural, KeyRole::Primary).unwrap();
        assert!(natural.is_hotspot());
        assert_eq!(natural.hottest_share, 1.0);

        // The index table of the decoupled layout is keyed by the natural id too.
        let index = analysis
            .get(KeyStrategy::DecoupledWithUniqueIndex, KeyRole::Index)
            .unwrap();
        assert!(index.is_hotspot());

        let hashed = analysis.get(KeyStrategy::Hashed, KeyRole::Primary).unwrap();
        assert!(!hashed.is_hotspot(), "hashed share {}", hashed.hottest_share);

        let decoupled = analysis
            .get(KeyStrategy::DecoupledWithUniqueIndex, KeyRole::Primary)
            .unwrap();
        assert!(!decoupled.is_hotspot());
    }

    #[test]
    fn test_random_ids_spread_everywhere() {
        let analysis = analyze(&config(IdScheme::Uuid)).unwrap();
        assert_eq!(analysis.distributions.len(), 5);
        for dist in &analysis.distributions {
            assert!(!dist.is_hotspot(), "{} {:?} is hot", dist.strategy, dist.role);
            assert_eq!(dist.counts.iter().sum::<u64>(), 4000);
        }
    }

    #[test]
    fn test_render_table_lists_every_layout() {
        let analysis = analyze(&config(IdScheme::Ulid)).unwrap();
        let rendered = analysis.render_table();
        for strategy in KeyStrategy::ALL {
            assert!(rendered.contains(strategy.name()));
        }
        assert!(rendered.contains("HOTSPOT"));
    }
}
