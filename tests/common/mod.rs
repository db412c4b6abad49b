use proptest::prelude::*;

#[allow(dead_code)]
pub(crate) fn assert_eq_iters<I: Iterator, J: Iterator<Item = I::Item>>(mut i: I, mut j: J)
where
    I::Item: std::fmt::Debug + Eq,
{
    loop {
        match (i.next(), j.next()) {
            (None, None) => return,
            (a, b) => assert_eq!(a, b),
        }
    }
}

// assert that every listed expression is equal to the first
macro_rules! assert_eq_all {
    ($first:expr $(, $rest:expr)+ $(,)?) => {{
        let first = $first;
        $( assert_eq!(first, $rest); )+
    }};
}

pub(crate) use assert_eq_all;

pub(crate) type U16Seq = Vec<u16>;

#[allow(dead_code)]
pub(crate) fn u16_seq() -> impl Strategy<Value = U16Seq> {
    prop::collection::vec(0u16..1024u16, 0..512)
}

pub(crate) type SmallIntPairs = Vec<(u16, u16)>;

#[allow(dead_code)]
pub(crate) fn small_int_pairs() -> impl Strategy<Value = SmallIntPairs> {
    prop::collection::vec((0u16..1024u16, 0u16..1024u16), 0..512)
}

#[allow(dead_code)]
pub(crate) fn string_u16_pairs() -> impl Strategy<Value = Vec<(String, u16)>> {
    prop::collection::vec(("[a-z]{0,2}", 0u16..1024u16), 0..512)
}
