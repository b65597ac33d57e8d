use blockrc::{Bytes, Context, SMALL_MAX};

fn collect(parts: Vec<Bytes>, ctx: &mut Context) -> Vec<Vec<u8>> {
    parts
        .into_iter()
        .map(|b| {
            let v = b.as_slice().to_vec();
            b.drop(ctx);
            v
        })
        .collect()
}

#[test]
fn find_replace_round_trip() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"hello world", &mut ctx);
    assert_eq!(b.len(), 11);
    assert_eq!(b.index_of(b"world"), 7);

    let b = b.replace_all(b"world", b"there", &mut ctx);
    assert_eq!(b.as_slice(), b"hello there");

    b.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn small_and_normal_boundary() {
    let mut ctx = Context::new();
    let small = Bytes::from_slice(&[b'x'; SMALL_MAX], &mut ctx);
    let normal = Bytes::from_slice(&[b'x'; SMALL_MAX + 1], &mut ctx);
    assert_eq!(small.len(), SMALL_MAX);
    assert_eq!(normal.len(), SMALL_MAX + 1);
    assert_eq!(&small.as_slice()[..SMALL_MAX], &normal.as_slice()[..SMALL_MAX]);
    small.drop(&mut ctx);
    normal.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn alloc_returns_writable_buffer() {
    let mut ctx = Context::new();
    let (b, p) = Bytes::alloc(4, b"ab", &mut ctx);
    unsafe {
        *p.add(2) = b'c';
        *p.add(3) = b'd';
    }
    assert_eq!(b.as_slice(), b"abcd");
    b.drop(&mut ctx);
}

#[test]
fn adjust_length_shrinks_unique_normal_in_place() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(&[7u8; 100], &mut ctx);
    let addr = b.as_slice().as_ptr();

    // within a quarter of the old length: same handle, new length
    let b = b.adjust_length(80, &mut ctx);
    assert_eq!(b.len(), 80);
    assert_eq!(b.as_slice().as_ptr(), addr);

    // 50 < 0.75 * 80: allocates
    let b = b.adjust_length(50, &mut ctx);
    assert_eq!(b.len(), 50);
    assert_ne!(b.as_slice().as_ptr(), addr);

    b.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn adjust_length_identity_and_empty() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"abc", &mut ctx);
    let addr = b.as_slice().as_ptr();
    let b = b.adjust_length(3, &mut ctx);
    assert_eq!(b.as_slice().as_ptr(), addr);

    let b = b.adjust_length(0, &mut ctx);
    assert!(b.is_empty());
    b.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn adjust_length_shared_copies() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(&[1u8; 100], &mut ctx);
    let keep = b.dup();
    let addr = keep.as_slice().as_ptr();

    let shrunk = b.adjust_length(90, &mut ctx);
    assert_ne!(shrunk.as_slice().as_ptr(), addr);
    assert_eq!(keep.len(), 100);

    shrunk.drop(&mut ctx);
    keep.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn adjust_length_extension_zero_fills() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"ab", &mut ctx);
    let b = b.adjust_length(5, &mut ctx);
    assert_eq!(b.as_slice(), &[b'a', b'b', 0, 0, 0]);
    b.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn cat_and_cat_slice() {
    let mut ctx = Context::new();
    let a = Bytes::from_slice(b"hello ", &mut ctx);
    let b = Bytes::from_slice(b"world", &mut ctx);
    let ab = a.cat(b, &mut ctx);
    assert_eq!(ab.as_slice(), b"hello world");

    let ab = ab.cat_slice(b"!", &mut ctx);
    assert_eq!(ab.as_slice(), b"hello world!");

    let same = ab.cat_slice(b"", &mut ctx);
    assert_eq!(same.as_slice(), b"hello world!");

    same.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn count_pattern_is_non_overlapping() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"aaaa", &mut ctx);
    assert_eq!(b.count_pattern(b"aa"), 2);
    assert_eq!(b.count_pattern(b"aaa"), 1);
    assert_eq!(b.count_pattern(b""), 4);
    assert_eq!(b.count_pattern(b"b"), 0);
    b.drop(&mut ctx);
}

#[test]
fn index_of_conventions() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"abcabc", &mut ctx);
    assert_eq!(b.index_of(b"abc"), 1);
    assert_eq!(b.index_of(b"bc"), 2);
    assert_eq!(b.index_of(b"zzz"), 0);
    assert_eq!(b.index_of(b""), 1);
    assert_eq!(b.last_index_of(b"abc"), 4);
    assert_eq!(b.last_index_of(b"zzz"), 0);
    assert_eq!(b.last_index_of(b""), 6);
    assert_eq!(b.last_index_of(b"abcabc"), 1);

    let e = Bytes::empty();
    assert_eq!(e.index_of(b""), 0);
    assert_eq!(e.last_index_of(b""), 0);

    b.drop(&mut ctx);
    e.drop(&mut ctx);
}

#[test]
fn affix_predicates() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"prefix", &mut ctx);
    assert!(b.starts_with(b"pre"));
    assert!(!b.starts_with(b"fix"));
    assert!(b.ends_with(b"fix"));
    assert!(!b.ends_with(b"pre"));
    assert!(b.contains(b"efi"));
    assert!(!b.contains(b"xyz"));

    // an empty needle matches iff the haystack is non-empty
    assert!(b.starts_with(b""));
    assert!(b.ends_with(b""));
    let e = Bytes::empty();
    assert!(!e.starts_with(b""));
    assert!(!e.ends_with(b""));

    b.drop(&mut ctx);
    e.drop(&mut ctx);
}

#[test]
fn replace_equal_width_unique_is_in_place() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"one two one two one", &mut ctx);
    let addr = b.as_slice().as_ptr();
    let b = b.replace_all(b"one", b"six", &mut ctx);
    assert_eq!(b.as_slice(), b"six two six two six");
    assert_eq!(b.as_slice().as_ptr(), addr);
    b.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn replace_shared_handle_copies() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"one two", &mut ctx);
    let keep = b.dup();
    let r = b.replace_all(b"one", b"six", &mut ctx);
    assert_eq!(r.as_slice(), b"six two");
    assert_eq!(keep.as_slice(), b"one two");
    r.drop(&mut ctx);
    keep.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn replace_widening_and_narrowing() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"a-b-c", &mut ctx);
    let b = b.replace_all(b"-", b"--", &mut ctx);
    assert_eq!(b.as_slice(), b"a--b--c");
    let b = b.replace_all(b"--", b"", &mut ctx);
    assert_eq!(b.as_slice(), b"abc");
    b.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn replace_does_not_rescan_replacements() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"aaa", &mut ctx);
    let b = b.replace_all(b"a", b"ab", &mut ctx);
    assert_eq!(b.as_slice(), b"ababab");
    b.drop(&mut ctx);
}

#[test]
fn replace_respects_limit() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"x.x.x.x", &mut ctx);
    let b = b.replace_atmost(b".", b"!", 2, &mut ctx);
    assert_eq!(b.as_slice(), b"x!x!x.x");

    let addr = b.as_slice().as_ptr();
    let b = b.replace_atmost(b".", b"!", 0, &mut ctx);
    assert_eq!(b.as_slice().as_ptr(), addr); // identity

    b.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn replace_no_match_is_identity() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"abc", &mut ctx);
    let keep = b.dup(); // force the counting path
    let addr = b.as_slice().as_ptr();
    let b = b.replace_all(b"zz", b"yy", &mut ctx);
    assert_eq!(b.as_slice().as_ptr(), addr);
    b.drop(&mut ctx);
    keep.drop(&mut ctx);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn split_keeps_empty_parts() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"a,b,,c", &mut ctx);
    let parts = collect(b.split(b",", &mut ctx), &mut ctx);
    assert_eq!(parts, vec![b"a".to_vec(), b"b".to_vec(), b"".to_vec(), b"c".to_vec()]);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn split_empty_separator_yields_single_bytes() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"abc", &mut ctx);
    let parts = collect(b.split_atmost(b"", 10, &mut ctx), &mut ctx);
    assert_eq!(parts, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

    let b = Bytes::from_slice(b"abc", &mut ctx);
    let parts = collect(b.split_atmost(b"", 2, &mut ctx), &mut ctx);
    assert_eq!(parts, vec![b"a".to_vec(), b"bc".to_vec()]);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn split_limit_keeps_remainder_unsplit() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"a,b,c,d", &mut ctx);
    let parts = collect(b.split_atmost(b",", 2, &mut ctx), &mut ctx);
    assert_eq!(parts, vec![b"a".to_vec(), b"b,c,d".to_vec()]);

    let b = Bytes::from_slice(b"abc", &mut ctx);
    let parts = collect(b.split(b"x", &mut ctx), &mut ctx);
    assert_eq!(parts, vec![b"abc".to_vec()]);

    let b = Bytes::empty();
    let parts = collect(b.split(b",", &mut ctx), &mut ctx);
    assert_eq!(parts, vec![b"".to_vec()]);
    assert_eq!(ctx.live(), 0);
}

#[test]
fn repeat_basic() {
    let mut ctx = Context::new();
    let b = Bytes::from_slice(b"ab", &mut ctx);
    let b = b.repeat(3, &mut ctx);
    assert_eq!(b.as_slice(), b"ababab");
    b.drop(&mut ctx);

    let e = Bytes::empty().repeat(5, &mut ctx);
    assert!(e.is_empty());
    e.drop(&mut ctx);

    let b = Bytes::from_slice(b"x", &mut ctx);
    let z = b.repeat(0, &mut ctx);
    assert!(z.is_empty());
    z.drop(&mut ctx);

    let b = Bytes::from_slice(b"x", &mut ctx);
    let x5 = b.repeat(5, &mut ctx);
    assert_eq!(x5.as_slice(), b"xxxxx");
    x5.drop(&mut ctx);

    assert_eq!(ctx.live(), 0);
}

#[test]
fn ordering_breaks_prefix_ties_by_length() {
    let mut ctx = Context::new();
    let ab = Bytes::from_slice(b"ab", &mut ctx);
    let abc = Bytes::from_slice(b"abc", &mut ctx);
    let b = Bytes::from_slice(b"b", &mut ctx);
    assert!(ab < abc);
    assert!(abc < b);
    assert_eq!(ab.cmp(&ab), std::cmp::Ordering::Equal);
    assert_eq!(ab, b"ab"[..]);
    assert_eq!(ab, &b"ab"[..]);
    assert_eq!(ab, b"ab".to_vec());
    ab.drop(&mut ctx);
    abc.drop(&mut ctx);
    b.drop(&mut ctx);
}

#[test]
fn split_inverts_join_with_fresh_separator() {
    let mut ctx = Context::new();
    let parts: [&[u8]; 3] = [b"a", b"bb", b"ccc"];

    let mut joined = Bytes::empty();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            joined = joined.cat_slice(b",", &mut ctx);
        }
        joined = joined.cat_slice(p, &mut ctx);
    }
    assert_eq!(joined.as_slice(), b"a,bb,ccc");

    let split = collect(joined.split(b",", &mut ctx), &mut ctx);
    assert_eq!(split, parts.iter().map(|p| p.to_vec()).collect::<Vec<_>>());
    assert_eq!(ctx.live(), 0);
}

quickcheck::quickcheck! {
    fn prop_cmp_antisymmetric(a: Vec<u8>, b: Vec<u8>) -> bool {
        let mut ctx = Context::new();
        let ba = Bytes::from_slice(&a, &mut ctx);
        let bb = Bytes::from_slice(&b, &mut ctx);
        let ord = ba.cmp(&bb);
        let rev = bb.cmp(&ba);
        let reflexive = ba.cmp(&ba) == std::cmp::Ordering::Equal;
        ba.drop(&mut ctx);
        bb.drop(&mut ctx);
        ord == rev.reverse() && reflexive && ctx.live() == 0
    }

    fn prop_replace_identity(data: Vec<u8>, pat: Vec<u8>) -> bool {
        let mut ctx = Context::new();
        let b = Bytes::from_slice(&data, &mut ctx);
        let b = b.replace_all(&pat, &pat, &mut ctx);
        let same = b.as_slice() == &data[..];
        b.drop(&mut ctx);
        same && ctx.live() == 0
    }

    fn prop_split_inverts_join(parts: Vec<Vec<u8>>) -> bool {
        // the separator must not occur inside any part
        let parts: Vec<Vec<u8>> = parts
            .into_iter()
            .map(|p| p.into_iter().filter(|&b| b != b',').collect())
            .collect();
        if parts.is_empty() {
            return true;
        }
        let mut ctx = Context::new();
        let mut joined = Bytes::empty();
        for (i, p) in parts.iter().enumerate() {
            if i > 0 {
                joined = joined.cat_slice(b",", &mut ctx);
            }
            joined = joined.cat_slice(p, &mut ctx);
        }
        let split = collect(joined.split(b",", &mut ctx), &mut ctx);
        split == parts && ctx.live() == 0
    }

    fn prop_cat_preserves_prefix(a: Vec<u8>, b: Vec<u8>) -> bool {
        let mut ctx = Context::new();
        let ba = Bytes::from_slice(&a, &mut ctx);
        let bb = Bytes::from_slice(&b, &mut ctx);
        let cat = ba.dup().cat(bb, &mut ctx);
        let ok = if a.is_empty() {
            cat.len() == b.len()
        } else {
            cat.starts_with(&a)
        };
        cat.drop(&mut ctx);
        ba.drop(&mut ctx);
        ok && ctx.live() == 0
    }
}
