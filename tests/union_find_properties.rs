#[path = "../src/test_support.rs"]
mod test_support;

use dss_export::{DisjointSetStruct, NodeId};
use test_support::{build_dsu, random_unions, reference_labels};

#[test]
fn find_matches_transitive_closure() {
    for seed in 0..20u64 {
        let n = 200;
        let unions = random_unions(n, 120, seed);
        let mut dsu = build_dsu(n as usize, &unions);
        let labels = reference_labels(n as usize, &unions);

        for a in 0..n {
            for b in (a..n).step_by(7) {
                let connected = dsu.find(NodeId(a)) == dsu.find(NodeId(b));
                assert_eq!(
                    connected,
                    labels[a as usize] == labels[b as usize],
                    "seed {seed}: {a} vs {b}"
                );
            }
        }
    }
}

#[test]
fn find_no_opt_agrees_with_find_after_every_union() {
    let n = 128u32;
    let unions = random_unions(n, 300, 99);
    let mut dsu = DisjointSetStruct::new(n as usize);

    for (step, &(a, b)) in unions.iter().enumerate() {
        dsu.union(a, b);
        let roots: Vec<NodeId> = (0..n).map(|i| dsu.find_no_opt(NodeId(i))).collect();
        for i in (0..n).rev() {
            assert_eq!(dsu.find(NodeId(i)), roots[i as usize], "step {step}, id {i}");
        }
    }
}

#[test]
fn set_count_matches_reference() {
    let n = 500u32;
    let unions = random_unions(n, 400, 7);
    let dsu = build_dsu(n as usize, &unions);
    let labels = reference_labels(n as usize, &unions);

    let mut distinct = labels.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(dsu.set_count(), distinct.len());
    assert_eq!(dsu.components().len(), distinct.len());

    let total: usize = dsu.components().iter().map(|c| c.len()).sum();
    assert_eq!(total, n as usize);
}

#[test]
fn frozen_structure_matches_construction_phase() {
    let n = 1_000u32;
    let unions = random_unions(n, 700, 3);
    let dsu = build_dsu(n as usize, &unions);
    let expected: Vec<NodeId> = (0..n).map(|i| dsu.find_no_opt(NodeId(i))).collect();
    let set_count = dsu.set_count();

    let frozen = dsu.freeze();
    assert_eq!(frozen.set_count(), set_count);
    for i in 0..n {
        assert_eq!(frozen.find_no_opt(NodeId(i)), expected[i as usize]);
    }
}
