pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub(crate) const DEFAULT_DATA_DIR: &str = "./Database";
pub(crate) const DEFAULT_LOG_DIR: &str = "./logs";
/// Trustline limit and minted amount for an issued asset.
pub(crate) const ASSET_TRUST_LIMIT: u64 = 1_000;
pub(crate) const ASSET_MINT_AMOUNT: u64 = 100;
pub(crate) const MAX_ASSET_CODE_LEN: usize = 12;
