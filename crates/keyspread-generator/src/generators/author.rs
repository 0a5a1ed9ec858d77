//! Author and favorites generators.

use rand::Rng;

/// The fixed, low-cardinality author set.
pub const AUTHORS: [&str; 5] = ["gold", "silver", "dia", "ruby", "sapphire"];

/// Upper bound (exclusive) on the number of favorites draws.
const MAX_FAVORITE_DRAWS: usize = 4;

pub fn pick_author<R: Rng>(rng: &mut R) -> &'static str {
    AUTHORS[rng.gen_range(0..AUTHORS.len())]
}

/// Draw 0 to 3 authors and drop repeats, keeping first-draw order.
pub fn pick_favorites<R: Rng>(rng: &mut R) -> Vec<String> {
    let draws = rng.gen_range(0..MAX_FAVORITE_DRAWS);
    let mut favorites: Vec<String> = Vec::with_capacity(draws);
    for _ in 0..draws {
        let author = pick_author(rng);
        if !favorites.iter().any(|f| f == author) {
            favorites.push(author.to_string());
        }
    }
    favorites
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_favorites_unique_and_bounded() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut sizes = HashSet::new();
        for _ in 0..5_000 {
            let favorites = pick_favorites(&mut rng);
            let unique: HashSet<&String> = favorites.iter().collect();
            assert_eq!(unique.len(), favorites.len());
            assert!(favorites.len() <= 3);
            assert!(favorites.iter().all(|f| AUTHORS.contains(&f.as_str())));
            sizes.insert(favorites.len());
        }
        assert_eq!(sizes.len(), 4, "expected every size 0..=3, got {sizes:?}");
    }

    #[test]
    fn test_every_author_drawn() {
        let mut rng = StdRng::seed_from_u64(2);
        let drawn: HashSet<&str> = (0..1_000).map(|_| pick_author(&mut rng)).collect();
        assert_eq!(drawn.len(), AUTHORS.len());
    }

    #[test]
    fn test_authors_are_lowercase_words() {
        // Composite keys put the author in front of the separator.
        for author in AUTHORS {
            assert!(author.chars().all(|c| c.is_ascii_lowercase()), "{author}");
        }
    }
}
