//! Property-based checks of the format invariants.

use proptest::prelude::*;
use tron::{Document, Segment, TronValue, canonical, decode_value, vacuum};

fn arb_scalar() -> impl Strategy<Value = TronValue> {
    prop_oneof![
        Just(TronValue::Nil),
        any::<bool>().prop_map(TronValue::Bool),
        any::<i64>().prop_map(TronValue::I64),
        (-1.0e15f64..1.0e15f64).prop_map(TronValue::F64),
        "[a-z0-9]{0,12}".prop_map(TronValue::Txt),
        prop::collection::vec(any::<u8>(), 0..24).prop_map(TronValue::Bin),
    ]
}

fn arb_value() -> impl Strategy<Value = TronValue> {
    arb_scalar().prop_recursive(3, 48, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..10).prop_map(TronValue::Arr),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..10).prop_map(TronValue::Map),
        ]
    })
}

proptest! {
    #[test]
    fn decode_inverts_encode(value in arb_value()) {
        let doc = Document::encode(&value).unwrap();
        prop_assert_eq!(doc.decode().unwrap(), value);
    }

    #[test]
    fn reencode_equals_canonical(base in arb_value(), key in "[a-z]{1,6}") {
        // give the buffer some history first
        let doc = Document::encode(&TronValue::map([("root", base)])).unwrap();
        let doc = doc.set_path(&[Segment::Key(key)], &TronValue::I64(1)).unwrap();

        let canon = canonical(&doc).unwrap();
        let reencoded = Document::encode(&doc.decode().unwrap()).unwrap();
        prop_assert_eq!(canon.as_bytes(), reencoded.as_bytes());
    }

    #[test]
    fn canonical_is_idempotent(value in arb_value()) {
        let doc = Document::encode(&value).unwrap();
        let once = canonical(&doc).unwrap();
        let twice = canonical(&once).unwrap();
        prop_assert_eq!(once.as_bytes(), twice.as_bytes());
    }

    #[test]
    fn vacuum_preserves_content_and_drops_history(
        base in arb_value(),
        key in "[a-z]{1,6}",
    ) {
        let doc = Document::encode(&TronValue::map([("root", base)])).unwrap();
        let doc = doc.set_path(&[Segment::Key(key)], &TronValue::Bool(true)).unwrap();

        let vac = vacuum(&doc).unwrap();
        prop_assert_eq!(vac.prev_root_addr(), 0u32);
        prop_assert_eq!(vac.decode().unwrap(), doc.decode().unwrap());

        let again = vacuum(&vac).unwrap();
        prop_assert_eq!(vac.as_bytes(), again.as_bytes());
    }

    #[test]
    fn set_path_installs_value_in_model(
        entries in prop::collection::btree_map("[a-z]{1,6}", arb_value(), 0..8),
        key in "[a-z]{1,6}",
        value in arb_scalar(),
    ) {
        let doc = Document::encode(&TronValue::Map(entries.clone())).unwrap();
        let doc2 = doc.set_path(&[Segment::Key(key.clone())], &value).unwrap();

        let mut expected = entries;
        expected.insert(key, value);
        prop_assert_eq!(doc2.decode().unwrap(), TronValue::Map(expected));

        // history link points at the input's root, which still decodes
        prop_assert_eq!(doc2.prev_root_addr(), doc.root_addr());
        prop_assert_eq!(
            decode_value(doc2.as_bytes(), doc2.prev_root_addr()).unwrap(),
            doc.decode().unwrap()
        );
    }

    #[test]
    fn array_writes_match_vec_semantics(
        items in prop::collection::vec(arb_scalar(), 1..20),
        index in 0u32..40,
        value in arb_scalar(),
    ) {
        let doc = Document::encode(&TronValue::Arr(items.clone())).unwrap();
        let doc2 = doc.set_path(&[Segment::Index(index)], &value).unwrap();

        let mut expected = items;
        if (index as usize) >= expected.len() {
            expected.resize(index as usize + 1, TronValue::Nil);
        }
        expected[index as usize] = value;
        prop_assert_eq!(doc2.decode().unwrap(), TronValue::Arr(expected));
    }
}
