use burn::data::dataset::Dataset;

use crate::domain::bucket::Bucket;
use crate::domain::dialogue::TokenPair;

/// All tokenised pairs that share one bucket shape.
#[derive(Debug, Clone)]
pub struct BucketDataset {
    bucket: Bucket,
    pairs:  Vec<TokenPair>,
}

impl BucketDataset {
    pub fn new(bucket: Bucket) -> Self {
        Self { bucket, pairs: Vec::new() }
    }

    pub fn bucket(&self) -> Bucket { self.bucket }

    pub fn push(&mut self, pair: TokenPair) {
        self.pairs.push(pair);
    }

    pub fn pairs(&self) -> &[TokenPair] { &self.pairs }
}

impl Dataset<TokenPair> for BucketDataset {
    fn get(&self, index: usize) -> Option<TokenPair> {
        self.pairs.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }
}
