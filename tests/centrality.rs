//! Batch betweenness centrality over a fixed 15-vertex digraph, computed
//! entirely through masked, accumulated, deferred operations.

use ferroblas::*;

const EDGES: &[(Ix, Ix)] = &[
    (0, 1),
    (0, 2),
    (0, 3),
    (0, 4),
    (1, 5),
    (1, 6),
    (2, 7),
    (2, 8),
    (3, 9),
    (3, 10),
    (4, 11),
    (4, 12),
    (6, 13),
    (7, 13),
    (10, 14),
    (11, 14),
];

#[test]
fn betweenness_centrality_batch() -> anyhow::Result<()> {
    let n: Ix = 15;
    let sources: [Ix; 5] = [0, 1, 2, 3, 4];
    let ns = sources.len() as Ix;
    let ring = ops::plus_times::<f64>();

    let mut a = Matrix::<f64>::new(n, n)?;
    let (rows, cols): (Vec<_>, Vec<_>) = EDGES.iter().copied().unzip();
    a.build(&rows, &cols, &vec![1.0; EDGES.len()], None)?;

    // paths[q][v] accumulates the number of shortest paths from source q.
    let mut paths = Matrix::<f64>::new(ns, n)?;
    {
        let (qs, vs): (Vec<_>, Vec<_>) = sources.iter().copied().enumerate()
            .map(|(q, s)| (q as Ix, s))
            .unzip();
        paths.build(&qs, &vs, &vec![1.0; sources.len()], None)?;
    }

    // First frontier: the sources' out-neighbors, not yet visited.
    let mut frontier = Matrix::<f64>::new(ns, n)?;
    frontier.mxm(
        Some(&paths.as_structure()),
        None,
        &ring,
        &paths,
        &a,
        Descriptor::new().with_replace().with_complement(),
    )?;
    frontier.wait(WaitMode::Materialize)?;

    // Forward sweep: record one frontier per depth.
    let mut sigmas: Vec<Matrix<f64>> = Vec::new();
    while frontier.nvals()? > 0 {
        sigmas.push(frontier.dup());
        paths.assign(
            None,
            Some(&ops::plus::<f64>()),
            &frontier,
            &all(ns),
            &all(n),
            Descriptor::new(),
        )?;
        paths.wait(WaitMode::Materialize)?;

        let reached = frontier.dup();
        frontier.mxm(
            Some(&paths.as_structure()),
            None,
            &ring,
            &reached,
            &a,
            Descriptor::new().with_replace().with_complement(),
        )?;
        frontier.wait(WaitMode::Materialize)?;
    }
    let depth = sigmas.len();
    assert_eq!(depth, 3);

    // Backward sweep: bcu[q][v] carries 1 + delta_q(v), seeded dense.
    let mut bcu = Matrix::<f64>::new(ns, n)?;
    bcu.assign_constant(None, None, 1.0, &all(ns), &all(n), Descriptor::new())?;
    bcu.wait(WaitMode::Materialize)?;

    for d in (2..=depth).rev() {
        // W holds (1 + delta)/sigma on the depth-d wavefront.
        let mut w = Matrix::<f64>::new(ns, n)?;
        w.ewise_mult(
            Some(&sigmas[d - 1].as_structure()),
            None,
            &ops::div::<f64>(),
            &bcu,
            &paths,
            Descriptor::new().with_replace(),
        )?;

        // Pull the wavefront one level back along reversed edges.
        let mut t = Matrix::<f64>::new(ns, n)?;
        t.mxm(
            Some(&sigmas[d - 2].as_structure()),
            None,
            &ring,
            &w,
            &a,
            Descriptor::new().with_replace().with_transpose1(),
        )?;

        bcu.ewise_mult(
            None,
            Some(&ops::plus::<f64>()),
            &ops::times::<f64>(),
            &t,
            &paths,
            Descriptor::new(),
        )?;
        bcu.wait(WaitMode::Materialize)?;
    }

    // delta[v] = column sums of bcu minus the per-source seed.
    let mut colsum = Vector::<f64>::new(n)?;
    colsum.reduce_rows(
        None,
        None,
        &ops::plus_monoid::<f64>(),
        &bcu,
        Descriptor::new().with_transpose0(),
    )?;
    let mut delta = Vector::<f64>::new(n)?;
    let shift = ns as f64;
    delta.apply(
        None,
        None,
        &UnaryOp::new(move |x: &f64| x - shift),
        &colsum,
        Descriptor::new(),
    )?;

    let expected = [
        0.0, 2.5, 2.5, 2.5, 2.5, 0.0, 1.5, 1.5, 0.0, 0.0, 1.5, 1.5, 0.0, 0.0, 0.0,
    ];
    let (idx, val) = delta.extract_tuples()?;
    assert_eq!(idx, (0..n).collect::<Vec<_>>());
    for (i, v) in idx.iter().zip(&val) {
        assert!(
            (v - expected[*i as usize]).abs() < 1e-9,
            "vertex {i}: got {v}, want {}",
            expected[*i as usize]
        );
    }
    Ok(())
}
