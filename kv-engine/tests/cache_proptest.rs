use kv_common::{Key, Ttl, Value};
use kv_engine::Cache;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Put(u8, u8),
    Get(u8),
    Delete(u8),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6, 0u8..6).prop_map(|(k, v)| Op::Put(k, v)),
        (0u8..6).prop_map(Op::Get),
        (0u8..6).prop_map(Op::Delete),
    ]
}

proptest! {
    #[test]
    fn size_never_exceeds_capacity(ops in proptest::collection::vec(arb_op(), 0..200)) {
        let capacity = 4;
        let cache = Cache::new(capacity, Ttl::ZERO, None);
        for op in ops {
            match op {
                Op::Put(k, v) => {
                    let key = Key::new(vec![k]).unwrap();
                    let value = Value::new(vec![v]).unwrap();
                    cache.put(key, value, Ttl::ZERO);
                }
                Op::Get(k) => {
                    let key = Key::new(vec![k]).unwrap();
                    let _ = cache.get(&key);
                }
                Op::Delete(k) => {
                    let key = Key::new(vec![k]).unwrap();
                    cache.delete(&key);
                }
            }
            prop_assert!(cache.len() <= capacity);
        }
    }

    #[test]
    fn put_then_immediate_get_returns_same_value(k in 0u8..255, v in proptest::collection::vec(any::<u8>(), 0..16)) {
        let cache = Cache::new(16, Ttl::ZERO, None);
        let key = Key::new(vec![k]).unwrap();
        cache.put(key.clone(), Value::new(v.clone()).unwrap(), Ttl::ZERO);
        prop_assert_eq!(cache.get(&key).unwrap(), v);
    }
}
