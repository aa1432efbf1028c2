use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use super::record::JobKind;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// `<prefix>_<YYYYmmdd_HHMMSS_micros>_<seq>`. The sequence keeps ids unique
/// when two submissions land in the same microsecond.
pub fn generate_job_id(kind: JobKind) -> String {
    let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}_{}_{}",
        kind.id_prefix(),
        Utc::now().format("%Y%m%d_%H%M%S_%6f"),
        seq
    )
}
