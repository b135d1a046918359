use bstr::ByteSlice;

#[inline]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        _ => base,
    }
}

/// Return reverse complement of a DNA sequence.
pub fn rev_compl(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&x| complement(x)).collect()
}

fn first_field(name: &[u8]) -> &[u8] {
    name.fields().next().unwrap_or_default()
}

/// True if the names of two mates refer to the same fragment. Names are
/// compared up to the first whitespace, ignoring a `/1` `/2` mate suffix.
pub fn is_mate_pair(name1: &[u8], name2: &[u8]) -> bool {
    let (name1, name2) = (first_field(name1), first_field(name2));
    match (name1.strip_suffix(b"/1"), name2.strip_suffix(b"/2")) {
        (Some(n1), Some(n2)) => n1 == n2,
        _ => name1 == name2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rev_compl() {
        assert_eq!(rev_compl(b"AACGTN"), b"NACGTT");
        assert_eq!(rev_compl(b""), b"");
    }

    #[test]
    fn test_mate_names() {
        assert!(is_mate_pair(b"A01535:24:HW2MMDSX2:2:1359:8513:3458/1", b"A01535:24:HW2MMDSX2:2:1359:8513:3458/2"));
        assert!(is_mate_pair(b"read7", b"read7"));
        assert!(is_mate_pair(b"read7 1:N:0", b"read7 2:N:0"));
        assert!(!is_mate_pair(b"read7/1", b"read8/2"));
        assert!(!is_mate_pair(b"read7/2", b"read7/1"));
    }
}
