// ============================================================
// Layer 4 — Bucketing and Batch Sampling
// ============================================================
// Training batches are drawn one bucket at a time:
//
//   1. Pick a bucket with probability proportional to the
//      number of pairs it holds
//   2. Draw `batch_size` pairs from it uniformly, with
//      replacement
//
// Big buckets are visited more often, but every bucket keeps
// being trained on, which matters for the rare long pairs.

use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::dataset::BucketDataset;
use crate::domain::bucket::{bucket_for, Bucket};
use crate::domain::dialogue::TokenPair;

/// Tokenised corpus split into per-bucket datasets.
#[derive(Debug, Clone)]
pub struct BucketedCorpus {
    datasets: Vec<BucketDataset>,
    dropped:  usize,
}

impl BucketedCorpus {
    /// Place every pair in the first bucket that fits it.
    /// Pairs too long for every bucket are counted and dropped.
    pub fn from_pairs(buckets: &[Bucket], pairs: impl IntoIterator<Item = TokenPair>) -> Self {
        let mut datasets: Vec<BucketDataset> =
            buckets.iter().map(|&b| BucketDataset::new(b)).collect();
        let mut dropped = 0usize;

        for pair in pairs {
            match bucket_for(buckets, pair.query.len(), pair.reply.len()) {
                Some(i) => datasets[i].push(pair),
                None    => dropped += 1,
            }
        }

        if dropped > 0 {
            tracing::warn!("{} pairs did not fit any bucket and were dropped", dropped);
        }

        Self { datasets, dropped }
    }

    pub fn bucket_sizes(&self) -> Vec<usize> {
        self.datasets.iter().map(|d| d.len()).collect()
    }

    pub fn total_len(&self) -> usize {
        self.datasets.iter().map(|d| d.len()).sum()
    }

    pub fn dropped(&self) -> usize { self.dropped }

    pub fn dataset(&self, bucket_id: usize) -> Option<&BucketDataset> {
        self.datasets.get(bucket_id)
    }

    pub fn datasets(&self) -> &[BucketDataset] { &self.datasets }
}

/// Random bucket and batch selection over a `BucketedCorpus`.
pub struct BucketSampler {
    /// Cumulative share of pairs up to and including each bucket
    scale: Vec<f64>,
    rng:   StdRng,
}

impl BucketSampler {
    pub fn new(corpus: &BucketedCorpus, seed: u64) -> Self {
        let sizes = corpus.bucket_sizes();
        let total = sizes.iter().sum::<usize>().max(1) as f64;

        let mut running = 0usize;
        let scale = sizes
            .iter()
            .map(|&n| {
                running += n;
                running as f64 / total
            })
            .collect();

        Self { scale, rng: StdRng::seed_from_u64(seed) }
    }

    /// Returns `None` only when the corpus is empty.
    pub fn sample_bucket(&mut self) -> Option<usize> {
        if self.scale.last().copied().unwrap_or(0.0) <= 0.0 {
            return None;
        }
        let r: f64 = self.rng.gen();
        // Empty buckets have the same cumulative value as their
        // predecessor, so a strict comparison never selects them.
        self.scale
            .iter()
            .position(|&s| s > r)
            .or(Some(self.scale.len() - 1))
    }

    /// Draw a batch of `batch_size` pairs from a randomly chosen bucket.
    pub fn sample_batch(
        &mut self,
        corpus:     &BucketedCorpus,
        batch_size: usize,
    ) -> Option<(usize, Vec<TokenPair>)> {
        let bucket_id = self.sample_bucket()?;
        let dataset   = corpus.dataset(bucket_id)?;
        if dataset.is_empty() || batch_size == 0 {
            return None;
        }

        let batch = (0..batch_size)
            .filter_map(|_| dataset.get(self.rng.gen_range(0..dataset.len())))
            .collect();
        Some((bucket_id, batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(q: usize, r: usize) -> TokenPair {
        TokenPair::new(vec![5; q], vec![6; r])
    }

    fn buckets() -> Vec<Bucket> {
        vec![Bucket::new(3, 5), Bucket::new(6, 8)]
    }

    #[test]
    fn test_pairs_land_in_first_fitting_bucket() {
        let corpus = BucketedCorpus::from_pairs(
            &buckets(),
            vec![pair(2, 3), pair(3, 3), pair(5, 2), pair(9, 1)],
        );
        assert_eq!(corpus.bucket_sizes(), vec![2, 1]);
        assert_eq!(corpus.dropped(), 1);
        assert_eq!(corpus.total_len(), 3);
    }

    #[test]
    fn test_sampler_never_picks_empty_bucket() {
        let corpus  = BucketedCorpus::from_pairs(&buckets(), vec![pair(5, 2), pair(4, 4)]);
        let mut sampler = BucketSampler::new(&corpus, 3);
        for _ in 0..100 {
            assert_eq!(sampler.sample_bucket(), Some(1));
        }
    }

    #[test]
    fn test_sample_batch_has_requested_size() {
        let corpus  = BucketedCorpus::from_pairs(&buckets(), vec![pair(1, 1), pair(2, 2)]);
        let mut sampler = BucketSampler::new(&corpus, 9);
        let (bucket_id, batch) = sampler.sample_batch(&corpus, 4).unwrap();
        assert_eq!(bucket_id, 0);
        assert_eq!(batch.len(), 4);
    }

    #[test]
    fn test_empty_corpus_yields_nothing() {
        let corpus  = BucketedCorpus::from_pairs(&buckets(), Vec::new());
        let mut sampler = BucketSampler::new(&corpus, 0);
        assert!(sampler.sample_bucket().is_none());
        assert!(sampler.sample_batch(&corpus, 2).is_none());
    }
}
