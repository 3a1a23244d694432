use smallvec::SmallVec;
use std::cmp::Ordering;
use tessera_datatype::Value;

/// Composite key of an index entry, or a search key which may be
/// a prefix of the indexed columns for ordered indexes.
pub type IndexKey = SmallVec<[Value; 4]>;

/// Lexicographic comparison of two keys, null sorts first.
#[inline]
pub fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (l, r) in a.iter().zip(b) {
        match l.cmp(r) {
            Ordering::Equal => (),
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Compares the leading components of an entry key with a search key.
#[inline]
pub fn compare_prefix(key: &[Value], search: &[Value]) -> Ordering {
    let n = search.len().min(key.len());
    compare_keys(&key[..n], &search[..n])
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_key_order() {
        let a: IndexKey = smallvec![Value::Integer(1), Value::varchar("b")];
        let b: IndexKey = smallvec![Value::Integer(1), Value::varchar("c")];
        let n: IndexKey = smallvec![Value::Null, Value::varchar("z")];
        assert_eq!(compare_keys(&a, &b), Ordering::Less);
        assert_eq!(compare_keys(&n, &a), Ordering::Less);
        assert_eq!(compare_prefix(&b, &[Value::Integer(1)]), Ordering::Equal);
        assert_eq!(compare_prefix(&b, &[Value::BigInt(2)]), Ordering::Less);
    }
}
