use ferroblas::*;

fn tuples(v: &Vector<i64>) -> anyhow::Result<Vec<(Ix, i64)>> {
    let (i, x) = v.extract_tuples()?;
    Ok(i.into_iter().zip(x).collect())
}

#[test]
fn materialize_preserves_every_observable_read() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(12)?;
    v.build(&[0, 3, 7, 11], &[1, 2, 3, 4], None)?;
    v.set_element(5, 55)?;
    v.remove_element(3)?;
    v.set_element(0, 10)?;

    let before = tuples(&v)?;
    let nvals_before = v.nvals()?;
    v.wait(WaitMode::Materialize)?;
    let after = tuples(&v)?;

    assert_eq!(before, after);
    assert_eq!(nvals_before, v.nvals()?);
    assert_eq!(before, vec![(0, 10), (5, 55), (7, 3), (11, 4)]);
    Ok(())
}

#[test]
fn materialize_preserves_computed_results() -> anyhow::Result<()> {
    let mut u = Vector::<i64>::new(8)?;
    u.build(&[1, 3, 5], &[1, 3, 5], None)?;
    let mut v = Vector::<i64>::new(8)?;
    v.build(&[3, 4], &[30, 40], None)?;

    let mut w = Vector::<i64>::new(8)?;
    w.ewise_add(None, None, &ops::plus::<i64>(), &u, &v, Descriptor::new())?;

    let before = tuples(&w)?;
    w.wait(WaitMode::Materialize)?;
    assert_eq!(before, tuples(&w)?);
    Ok(())
}

#[test]
fn wait_complete_is_a_noop() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(4)?;
    v.set_element(1, 1)?;
    v.wait(WaitMode::Complete)?;
    assert_eq!(v.nvals()?, 1);
    Ok(())
}

#[test]
fn materialize_is_idempotent() -> anyhow::Result<()> {
    let mut m = Matrix::<i64>::new(5, 5)?;
    m.set_element(1, 1, 1)?;
    m.set_element(2, 3, 2)?;
    m.remove_element(1, 1)?;

    m.wait(WaitMode::Materialize)?;
    let first = m.extract_tuples()?;
    m.wait(WaitMode::Materialize)?;
    assert_eq!(first, m.extract_tuples()?);
    assert_eq!(m.nvals()?, 1);
    Ok(())
}

#[test]
fn shared_reference_optimize_is_visible_to_all_dups() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(6)?;
    v.set_element(0, 1)?;
    v.set_element(5, 2)?;
    let w = v.dup();

    // Optimizing through one handle collapses the shared reference; the
    // contents seen through both handles are unchanged.
    v.wait(WaitMode::Materialize)?;
    assert_eq!(tuples(&v)?, tuples(&w)?);
    Ok(())
}

#[test]
fn deferred_graph_composes_across_operations() -> anyhow::Result<()> {
    let mut u = Vector::<i64>::new(10)?;
    u.build(&[0, 2, 4, 6, 8], &[1, 2, 3, 4, 5], None)?;

    // Three stacked deferred operations, materialized only at the end.
    let mut w = Vector::<i64>::new(10)?;
    w.apply(None, None, &UnaryOp::new(|x: &i64| x * 2), &u, Descriptor::new())?;
    let w2 = w.dup();
    w.ewise_add(None, None, &ops::plus::<i64>(), &w2, &u, Descriptor::new())?;
    let w3 = w.dup();
    w.select(None, None, &ops::value_gt::<i64>(), &w3, 6, Descriptor::new())?;

    // apply doubles, add folds in u (3x), select keeps > 6.
    assert_eq!(tuples(&w)?, vec![(4, 9), (6, 12), (8, 15)]);
    w.wait(WaitMode::Materialize)?;
    assert_eq!(tuples(&w)?, vec![(4, 9), (6, 12), (8, 15)]);
    Ok(())
}

#[test]
fn matrix_materialize_collapses_delta_chain() -> anyhow::Result<()> {
    let mut m = Matrix::<i64>::new(64, 64)?;
    for i in 0..64 {
        m.set_element(i, (i * 7) % 64, i)?;
    }
    for i in (0..64).step_by(4) {
        m.remove_element(i, (i * 7) % 64)?;
    }
    let before = m.extract_tuples()?;
    m.wait(WaitMode::Materialize)?;
    assert_eq!(before, m.extract_tuples()?);
    assert_eq!(m.nvals()?, 48);
    Ok(())
}
