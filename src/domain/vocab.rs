// ============================================================
// Layer 3 — Special Vocabulary Ids
// ============================================================
// The first four ids of every vocabulary are reserved.
// The tokenizer store writes them in this order and the model
// relies on GO_ID / EOS_ID to start and stop decoding.

pub const PAD: &str = "_PAD";
pub const GO: &str = "_GO";
pub const EOS: &str = "_EOS";
pub const UNK: &str = "_UNK";

pub const PAD_ID: u32 = 0;
pub const GO_ID: u32 = 1;
pub const EOS_ID: u32 = 2;
pub const UNK_ID: u32 = 3;

/// Special tokens in id order.
pub const SPECIAL_TOKENS: [&str; 4] = [PAD, GO, EOS, UNK];

/// Strip everything from the first `_EOS` on and drop padding.
pub fn trim_reply(ids: &[u32]) -> Vec<u32> {
    ids.iter()
        .take_while(|&&id| id != EOS_ID)
        .copied()
        .filter(|&id| id != PAD_ID && id != GO_ID)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_tokens_match_ids() {
        assert_eq!(SPECIAL_TOKENS[PAD_ID as usize], PAD);
        assert_eq!(SPECIAL_TOKENS[GO_ID as usize], GO);
        assert_eq!(SPECIAL_TOKENS[EOS_ID as usize], EOS);
        assert_eq!(SPECIAL_TOKENS[UNK_ID as usize], UNK);
    }

    #[test]
    fn test_trim_reply_cuts_at_eos() {
        assert_eq!(trim_reply(&[7, 8, EOS_ID, 9, PAD_ID]), vec![7, 8]);
        assert_eq!(trim_reply(&[EOS_ID, 5]), Vec::<u32>::new());
        assert_eq!(trim_reply(&[4, PAD_ID, 5]), vec![4, 5]);
    }
}
