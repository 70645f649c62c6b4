// tests/graph_properties.rs

use std::collections::BTreeSet;

use pipedag::dag::DependencyGraph;
use pipedag_test_utils::builders::PipelineBuilder;
use proptest::prelude::*;

/// Random acyclic pipeline: step `i` may only read artifacts written by
/// steps `< i`. Each step writes one artifact `o<i>`.
fn dag_strategy(max_steps: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2..=max_steps).prop_flat_map(|n| {
        let links = proptest::collection::vec((0..n, 0..n), 0..n * 2).prop_map(move |raw| {
            raw.into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| if a < b { (a, b) } else { (b, a) })
                .collect::<Vec<_>>()
        });
        (Just(n), links)
    })
}

fn build(n: usize, links: &[(usize, usize)], back_edge: Option<(usize, usize)>) -> DependencyGraph {
    let mut builder = PipelineBuilder::new();
    for i in 0..n {
        let step = format!("s{i}");
        let out = format!("o{i}");
        builder = builder.step(&step).data(&out).produces(&step, &out);
    }
    for (producer, consumer) in links.iter().copied().chain(back_edge) {
        builder = builder.consumes(&format!("o{producer}"), &format!("s{consumer}"));
    }
    builder.graph()
}

fn names(g: &DependencyGraph) -> Vec<String> {
    g.steps().map(str::to_string).collect()
}

proptest! {
    #[test]
    fn forward_links_never_form_a_cycle((n, links) in dag_strategy(8)) {
        let g = build(n, &links, None);
        prop_assert!(!g.has_cycles());
        prop_assert!(g.detect_cycles().is_empty());
        prop_assert_eq!(g.topological_order().unwrap().len(), n);
    }

    #[test]
    fn upstream_and_downstream_mirror_each_other((n, links) in dag_strategy(8)) {
        let g = build(n, &links, None);
        for a in names(&g) {
            for b in names(&g) {
                prop_assert_eq!(g.downstream(&a).contains(&b), g.upstream(&b).contains(&a));
            }
        }
    }

    #[test]
    fn topological_order_respects_every_dependency((n, links) in dag_strategy(8)) {
        let g = build(n, &links, None);
        let order = g.topological_order().unwrap();
        let pos = |s: &str| order.iter().position(|o| o == s).unwrap();
        for step in names(&g) {
            for up in g.upstream(&step) {
                prop_assert!(pos(&up) < pos(&step));
            }
        }
    }

    #[test]
    fn blocked_set_is_running_plus_closures(
        (n, links) in dag_strategy(8),
        picks in proptest::collection::vec(0usize..8, 0..3),
    ) {
        let g = build(n, &links, None);
        let running: BTreeSet<String> = picks.iter().map(|i| format!("s{}", i % n)).collect();
        let blocked = g.blocked_steps(&running);

        for step in names(&g) {
            let related = running.contains(&step)
                || running.iter().any(|r| g.upstream(r).contains(&step) || g.downstream(r).contains(&step));
            prop_assert_eq!(blocked.contains(&step), related);
        }
    }

    #[test]
    fn a_back_edge_over_a_path_is_detected((n, links) in dag_strategy(8)) {
        let g = build(n, &links, None);
        // Find any dependent pair and close it with a back edge.
        let pair = names(&g).into_iter().find_map(|s| {
            g.upstream(&s).into_iter().next().map(|up| (up, s))
        });
        if let Some((up, down)) = pair {
            let up_idx: usize = up[1..].parse().unwrap();
            let down_idx: usize = down[1..].parse().unwrap();
            let cyclic = build(n, &links, Some((down_idx, up_idx)));
            let members = cyclic.detect_cycles();
            prop_assert!(cyclic.has_cycles());
            prop_assert!(members.contains(&up));
            prop_assert!(members.contains(&down));
        }
    }

    #[test]
    fn upstream_and_downstream_are_disjoint((n, links) in dag_strategy(8)) {
        let g = build(n, &links, None);
        for s in names(&g) {
            prop_assert!(g.upstream(&s).is_disjoint(&g.downstream(&s)));
        }
    }

    #[test]
    fn cycle_queries_agree_on_arbitrary_edges(
        (n, links) in dag_strategy(8),
        extra in (0usize..8, 0usize..8),
    ) {
        // The extra link may point backwards or at the step itself.
        let g = build(n, &links, Some((extra.0 % n, extra.1 % n)));
        prop_assert_eq!(g.has_cycles(), !g.detect_cycles().is_empty());
        if g.has_cycles() {
            prop_assert!(g.topological_order().is_err());
        } else {
            prop_assert_eq!(g.topological_order().unwrap().len(), n);
        }
    }
}
