// Hash join probe (spec §4.7): iterates the smaller side's key set and looks
// up the larger side's map, avoiding the nested-loop's full cross product
// when one side dominates.

use crate::build_rows::BuildRows;

pub fn probe(left: &BuildRows, right: &BuildRows) -> Vec<(Vec<u8>, Vec<u8>)> {
    let (BuildRows::Hash(left), BuildRows::Hash(right)) = (left, right) else {
        unreachable!("hash_join::probe called on nested-loop-variant build rows");
    };
    let (probe_side, build_side, swapped) =
        if left.len() <= right.len() { (left, right, false) } else { (right, left, true) };

    let mut out = Vec::new();
    for (key, probe_payloads) in probe_side {
        let Some(build_payloads) = build_side.get(key) else { continue };
        for p in probe_payloads {
            for b in build_payloads {
                if swapped {
                    out.push((b.clone(), p.clone()));
                } else {
                    out.push((p.clone(), b.clone()));
                }
            }
        }
    }
    out
}
