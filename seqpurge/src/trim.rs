use noodles::fastq;

/// Shorten a record to `len` bases.
pub fn truncate(record: &mut fastq::Record, len: usize) {
    record.sequence_mut().truncate(len);
    record.quality_scores_mut().truncate(len);
}

/// Quality trimming from the 3' end using a sliding window.
///
/// Windows of `window` bases are evaluated starting from the 3' end. The read
/// is cut behind the first window whose mean quality (score minus `offset`)
/// reaches `cutoff`; bases below `cutoff` at the end of that window are
/// removed as well. If no window reaches the cutoff, the whole read is
/// removed. Reads shorter than the window are left unchanged.
///
/// The cut is repeated until the read is stable, so trimming a read twice
/// removes nothing the second time. Returns the number of removed bases.
pub fn trim_quality(record: &mut fastq::Record, cutoff: u32, window: usize, offset: u8) -> usize {
    let count = record.quality_scores().len();
    let mut new_len = count;
    loop {
        let len = quality_cut(&record.quality_scores()[..new_len], cutoff, window, offset);
        if len == new_len {
            break;
        }
        new_len = len;
    }

    truncate(record, new_len);
    count - new_len
}

/// Length of `quals` after a single sliding window pass.
fn quality_cut(quals: &[u8], cutoff: u32, window: usize, offset: u8) -> usize {
    let count = quals.len();
    if window == 0 || count < window {
        return count;
    }

    let q = |i: usize| quals[i] as i64 - offset as i64;
    let cutoff = cutoff as i64;
    let threshold = cutoff * window as i64;

    let mut sum: i64 = (count + 1 - window..count).map(q).sum();
    for i in (0..=count - window).rev() {
        sum += q(i);
        if sum >= threshold {
            let mut new_len = i + window;
            while new_len > 0 && q(new_len - 1) < cutoff {
                new_len -= 1;
            }
            return new_len;
        }
        sum -= q(i + window - 1);
    }
    0
}

/// Cut the read at the first stretch of `num_n` consecutive `N` bases,
/// scanning from the 5' end. Returns the number of removed bases.
pub fn trim_n(record: &mut fastq::Record, num_n: usize) -> usize {
    let count = record.sequence().len();
    if num_n == 0 || count < num_n {
        return 0;
    }
    match record.sequence().windows(num_n).position(|w| w.iter().all(|&b| b == b'N')) {
        Some(start) => {
            truncate(record, start);
            count - start
        }
        None => 0,
    }
}
