// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Turns a tokenised message into reply ids:
//
//   1. pick the smallest bucket whose encoder side fits the query
//      (longer queries keep their first tokens in the largest bucket)
//   2. greedy decode with a forward-only step
//   3. cut the output at the first _EOS
use anyhow::{Context, Result};
use burn::prelude::*;

use crate::data::batcher::StepInput;
use crate::domain::bucket::Bucket;
use crate::domain::vocab::{trim_reply, UNK_ID};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::ChatSeq2SeqModel;

pub type InferBackend = burn::backend::Wgpu;

pub struct Inferencer<B: Backend> {
    model:   ChatSeq2SeqModel<B>,
    buckets: Vec<Bucket>,
    device:  B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(model: ChatSeq2SeqModel<B>, buckets: Vec<Bucket>, device: B::Device) -> Self {
        Self { model, buckets, device }
    }

    /// Rebuild the trained architecture and load the newest weights.
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager, device: B::Device) -> Result<Self> {
        let cfg       = ckpt_manager.load_config()?;
        let model_cfg = cfg.model_config();
        model_cfg.validate()?;

        let model = ckpt_manager.load_model(model_cfg.init::<B>(&device), &device)?;
        tracing::info!("Model loaded from checkpoint");
        Ok(Self::new(model, cfg.buckets, device))
    }

    pub fn bucket_for_query(&self, query_len: usize) -> Option<Bucket> {
        self.buckets
            .iter()
            .copied()
            .find(|b| query_len <= b.encoder_size)
            .or_else(|| self.buckets.last().copied())
    }

    pub fn reply_ids(&self, query: &[u32]) -> Result<Vec<u32>> {
        // the encoder needs at least one token
        let query = if query.is_empty() { vec![UNK_ID] } else { query.to_vec() };

        let bucket = self
            .bucket_for_query(query.len())
            .context("No buckets configured")?;
        if query.len() > bucket.encoder_size {
            tracing::warn!(
                "Message has {} tokens; only the first {} are used",
                query.len(), bucket.encoder_size
            );
        }

        let input = StepInput::for_inference(&[query], bucket);
        let rows  = self.model.predict(&input, &self.device)?;
        let ids   = rows.first().map(|r| trim_reply(r)).unwrap_or_default();

        tracing::debug!("bucket {:?} reply ids {:?}", bucket, ids);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::domain::vocab::{EOS_ID, GO_ID, PAD_ID};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn buckets() -> Vec<Bucket> {
        vec![Bucket::new(3, 5), Bucket::new(6, 8)]
    }

    fn inferencer() -> Inferencer<TestBackend> {
        let device = Default::default();
        let model  = crate::ml::model::Seq2SeqConfig::new(12, 12, 6, 1, 6, 1).init(&device);
        Inferencer::new(model, buckets(), device)
    }

    #[test]
    fn test_smallest_fitting_bucket_is_chosen() {
        let inf = inferencer();
        assert_eq!(inf.bucket_for_query(2), Some(Bucket::new(3, 5)));
        assert_eq!(inf.bucket_for_query(3), Some(Bucket::new(3, 5)));
        assert_eq!(inf.bucket_for_query(5), Some(Bucket::new(6, 8)));
        assert_eq!(inf.bucket_for_query(40), Some(Bucket::new(6, 8)));
    }

    #[test]
    fn test_reply_has_no_special_tokens() {
        let inf = inferencer();
        for query in [vec![4, 5], vec![], vec![4, 5, 6, 7, 8, 9, 10, 11, 4, 5]] {
            let ids = inf.reply_ids(&query).unwrap();
            // largest bucket: 6 reply tokens plus the _EOS step
            assert!(ids.len() <= 7);
            assert!(ids.iter().all(|&id| id != PAD_ID && id != GO_ID && id != EOS_ID));
        }
    }

    #[test]
    fn test_out_of_vocab_query_is_an_error() {
        assert!(inferencer().reply_ids(&[99]).is_err());
    }

    #[test]
    fn test_loads_from_checkpoint() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let cfg  = TrainConfig {
            input_vocab_size:  12,
            target_vocab_size: 12,
            enc_hidden_size:   6,
            enc_num_layers:    1,
            dec_hidden_size:   6,
            dec_num_layers:    1,
            buckets:           buckets(),
            ..TrainConfig::default()
        };
        ckpt.save_config(&cfg).unwrap();
        ckpt.save_model(&cfg.model_config().init::<TestBackend>(&Default::default()), 1).unwrap();

        let inf = Inferencer::<TestBackend>::from_checkpoint(&ckpt, Default::default()).unwrap();
        assert_eq!(inf.bucket_for_query(1), Some(Bucket::new(3, 5)));
        assert!(inf.reply_ids(&[4]).is_ok());
    }
}
