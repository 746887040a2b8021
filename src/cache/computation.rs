use std::hash::Hash;

use crate::cache::Session;

/// A typed computed artifact.
///
/// Implementors describe a pure derivation of `Output` from `Input`. They are
/// never called directly; requesting them through a [`Session`] or a
/// [`ComputedCache`](crate::ComputedCache) makes sure the derivation runs at
/// most once per run for equivalent inputs.
///
/// # Example
///
/// ```rust
/// use tracehouse::{Computation, ComputedCache, Session};
///
/// struct WordCount;
///
/// impl Computation for WordCount {
///     const NAME: &'static str = "WordCount";
///     type Input = str;
///     type Output = usize;
///
///     fn compute(_: &Session<'_>, input: &str) -> anyhow::Result<usize> {
///         Ok(input.split_whitespace().count())
///     }
/// }
///
/// let cache = ComputedCache::new();
/// assert_eq!(*cache.get::<WordCount>("three little words").unwrap(), 3);
/// ```
pub trait Computation: 'static {
    /// Kind of the computation, the first half of its cache key.
    const NAME: &'static str;

    /// Everything the output depends on. Its hash is the second half of the
    /// cache key.
    type Input: Hash + ?Sized;

    type Output: Send + Sync + 'static;

    fn compute(session: &Session<'_>, input: &Self::Input) -> anyhow::Result<Self::Output>;
}

#[cfg(test)]
mod tests {
    use crate::cache::{CacheStats, ComputationKey, ComputedCache, Session};

    use super::*;

    struct Parse;

    impl Computation for Parse {
        const NAME: &'static str = "Parse";
        type Input = str;
        type Output = Vec<u32>;

        fn compute(_: &Session<'_>, input: &str) -> anyhow::Result<Vec<u32>> {
            input
                .split(',')
                .map(|part| part.trim().parse::<u32>().map_err(anyhow::Error::from))
                .collect()
        }
    }

    struct Total;

    impl Computation for Total {
        const NAME: &'static str = "Total";
        type Input = str;
        type Output = u32;

        fn compute(session: &Session<'_>, input: &str) -> anyhow::Result<u32> {
            let numbers = session.get::<Parse>(input)?;
            Ok(numbers.iter().sum())
        }
    }

    struct Largest;

    impl Computation for Largest {
        const NAME: &'static str = "Largest";
        type Input = str;
        type Output = Option<u32>;

        fn compute(session: &Session<'_>, input: &str) -> anyhow::Result<Option<u32>> {
            let numbers = session.get::<Parse>(input)?;
            Ok(numbers.iter().copied().max())
        }
    }

    #[test]
    fn test_shared_upstream_runs_once() {
        let cache = ComputedCache::new();

        assert_eq!(*cache.get::<Total>("1, 2, 3, 40").unwrap(), 46);
        assert_eq!(*cache.get::<Largest>("1, 2, 3, 40").unwrap(), Some(40));

        // Total, Parse and Largest ran; the second Parse request was a hit.
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 3 });
        assert!(cache.is_complete(&ComputationKey::new(Parse::NAME, "1, 2, 3, 40")));
    }

    #[test]
    fn test_upstream_failure_fails_dependents() {
        let cache = ComputedCache::new();

        let err = cache.get::<Total>("1, two").unwrap_err();
        assert!(err.to_string().contains("Parse"));
        assert!(err.to_string().contains("Total"));
    }
}
