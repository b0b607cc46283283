use super::*;
use proptest::prelude::*;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

/// Transient length and cycle length of the orbit of `x`, by naive walking.
fn rho(map: &FunctionMap, x: usize) -> (u64, u64) {
    let mut first_visit = vec![None; map.size()];
    let mut current = x;
    let mut step = 0u64;
    loop {
        if let Some(seen_at) = first_visit[current] {
            return (seen_at, step - seen_at);
        }
        first_visit[current] = Some(step);
        current = map.as_slice()[current];
        step += 1;
    }
}

fn arb_function_map(max_size: usize) -> impl Strategy<Value = FunctionMap> {
    (1..=max_size)
        .prop_flat_map(|n| prop::collection::vec(0..n, n))
        .prop_map(|mapping| FunctionMap::new(mapping).unwrap())
}

#[test]
fn test_concrete_scenario_both_engines() {
    let f = FunctionMap::new(vec![1, 2, 2]).unwrap();
    let (lifting, graph) = build_engines(&f).unwrap();

    let expected = [((0, 0), 0), ((0, 1), 1), ((0, 2), 2), ((0, 100), 2), ((1, 0), 1), ((1, 1), 2), ((2, 5), 2)];
    for ((x, i), y) in expected {
        assert_eq!(lifting.eval(x, i).unwrap(), y);
        assert_eq!(graph.eval(x, i).unwrap(), y);
    }
}

#[test]
fn test_random_maps_against_naive() {
    let mut rng = ChaCha20Rng::seed_from_u64(2024);
    for size in [1, 2, 7, 64, 300] {
        let map = FunctionMap::random(size, &mut rng);
        let (lifting, graph) = build_engines(&map).unwrap();
        let params = CheckParams { max_steps: 2 * size as u64 + 5, parallel: true };

        assert!(cross_check(&map, &lifting, &params).unwrap().is_clean());
        assert!(cross_check(&map, &graph, &params).unwrap().is_clean());
    }
}

#[test]
fn test_engines_agree_on_huge_step_counts() {
    let mut rng = ChaCha20Rng::seed_from_u64(99);
    let map = FunctionMap::random(250, &mut rng);
    let (lifting, graph) = build_engines(&map).unwrap();

    for x in 0..map.size() {
        let (transient, cycle) = rho(&map, x);
        for i in [1u64 << 40, 123_456_789_012, u64::MAX - 7, u64::MAX] {
            let reduced = transient + (i - transient) % cycle;
            let expected = map.iterate(x, reduced).unwrap();
            assert_eq!(lifting.eval(x, i).unwrap(), expected);
            assert_eq!(graph.eval(x, i).unwrap(), expected);
        }
    }
}

#[test]
fn test_worst_case_chain_versus_doubling() {
    let map = FunctionMap::staircase(60);
    let (lifting, graph) = build_engines(&map).unwrap();

    let (_, graph_cost) = graph.eval_with_cost(0, 60).unwrap();
    let (_, lifting_cost) = lifting.eval_with_cost(0, 60).unwrap();
    assert_eq!(graph_cost.segments_crossed, 60);
    assert!(lifting_cost.table_lookups <= 6);

    let params = CheckParams { max_steps: 130, parallel: true };
    assert!(cross_check(&map, &graph, &params).unwrap().is_clean());
}

#[test]
fn test_engines_shared_across_threads() {
    let map = GeneratorParams::new(400, 5).generate().unwrap();
    let (lifting, graph) = build_engines(&map).unwrap();

    std::thread::scope(|scope| {
        for t in 0..4u64 {
            let (lifting, graph, map) = (&lifting, &graph, &map);
            scope.spawn(move || {
                for x in (t as usize..map.size()).step_by(4) {
                    let i = 1000 + t;
                    assert_eq!(lifting.eval(x, i).unwrap(), graph.eval(x, i).unwrap());
                }
            });
        }
    });
}

#[test]
fn test_closure_map_without_table() {
    // x -> 2x mod m, the doubling map
    let m = 1000;
    let doubling = FnSelfMap::new(m, |x| 2 * x % m);
    let (lifting, graph) = build_engines(&doubling).unwrap();
    let table = doubling.to_function_map().unwrap();

    for x in 0..m {
        assert_eq!(lifting.eval(x, 37).unwrap(), table.iterate(x, 37).unwrap());
        assert_eq!(graph.eval(x, 37).unwrap(), table.iterate(x, 37).unwrap());
    }
}

proptest! {
    #[test]
    fn test_zero_steps_is_identity(map in arb_function_map(200)) {
        let (lifting, graph) = build_engines(&map).unwrap();
        for x in 0..map.size() {
            prop_assert_eq!(lifting.eval(x, 0).unwrap(), x);
            prop_assert_eq!(graph.eval(x, 0).unwrap(), x);
        }
    }

    #[test]
    fn test_composition_law(
        map in arb_function_map(200),
        seed in any::<u64>(),
        i in 0u64..(1 << 62),
        j in 0u64..(1 << 62),
    ) {
        let (lifting, graph) = build_engines(&map).unwrap();
        let x = (seed % map.size() as u64) as usize;

        let direct = lifting.eval(x, i + j).unwrap();
        prop_assert_eq!(lifting.eval(lifting.eval(x, i).unwrap(), j).unwrap(), direct);
        prop_assert_eq!(graph.eval(graph.eval(x, i).unwrap(), j).unwrap(), direct);
        prop_assert_eq!(graph.eval(x, i + j).unwrap(), direct);
    }

    #[test]
    fn test_periodicity(map in arb_function_map(150), seed in any::<u64>(), k in 0u64..100_000) {
        let (lifting, graph) = build_engines(&map).unwrap();
        let x = (seed % map.size() as u64) as usize;
        let (transient, cycle) = rho(&map, x);

        let info = lifting.transient_info(x).unwrap();
        prop_assert_eq!(info.length as u64, transient);
        prop_assert_eq!(lifting.cycles()[info.cycle].len() as u64, cycle);

        let folded = map.iterate(x, transient + k % cycle).unwrap();
        prop_assert_eq!(lifting.eval(x, transient + k).unwrap(), folded);
        prop_assert_eq!(graph.eval(x, transient + k).unwrap(), folded);
    }

    #[test]
    fn test_matches_naive_and_cost_bounds(map in arb_function_map(120)) {
        let (lifting, graph) = build_engines(&map).unwrap();
        let depth = graph.stats().max_chain_depth;

        for x in 0..map.size() {
            let mut expected = x;
            for i in 0..(2 * map.size() as u64) {
                let (a, lifting_cost) = lifting.eval_with_cost(x, i).unwrap();
                let (b, graph_cost) = graph.eval_with_cost(x, i).unwrap();
                prop_assert_eq!(a, expected);
                prop_assert_eq!(b, expected);
                prop_assert!(lifting_cost.table_lookups <= (u64::BITS - i.leading_zeros()) as usize);
                prop_assert!(graph_cost.segments_crossed <= depth);
                expected = map.as_slice()[expected];
            }
        }
    }

    #[test]
    fn test_out_of_range_rejected(map in arb_function_map(50), offset in 0usize..10, i in any::<u64>()) {
        let (lifting, graph) = build_engines(&map).unwrap();
        let x = map.size() + offset;
        prop_assert!(lifting.eval(x, i).unwrap_err().is_invalid_argument());
        prop_assert!(graph.eval(x, i).unwrap_err().is_invalid_argument());
    }
}
