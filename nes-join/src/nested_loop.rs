// Nested-loop join probe (spec §4.7): O(|L| x |R|), no index required. Used
// when the handler is configured with `JoinVariant::NestedLoop`.

use crate::build_rows::BuildRows;

pub fn probe(left: &BuildRows, right: &BuildRows) -> Vec<(Vec<u8>, Vec<u8>)> {
    let (BuildRows::NestedLoop(left), BuildRows::NestedLoop(right)) = (left, right) else {
        unreachable!("nested_loop::probe called on hash-variant build rows");
    };
    let mut out = Vec::new();
    for (lk, lp) in left {
        for (rk, rp) in right {
            if lk == rk {
                out.push((lp.clone(), rp.clone()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_product_matches_only_equal_keys() {
        let mut left = BuildRows::new_nested_loop();
        left.push(b"0", vec![1]);
        left.push(b"0", vec![2]);
        left.push(b"1", vec![9]);
        let mut right = BuildRows::new_nested_loop();
        right.push(b"0", vec![3]);

        let joined = probe(&left, &right);
        assert_eq!(joined, vec![(vec![1], vec![3]), (vec![2], vec![3])]);
    }
}
