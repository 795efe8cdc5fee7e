use ferroblas::*;

#[test]
fn set_then_get_roundtrip() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(10)?;
    v.set_element(3, 30)?;
    v.set_element(7, 70)?;
    v.set_element(0, 1)?;

    assert_eq!(v.extract_element(3)?, 30);
    assert_eq!(v.extract_element(7)?, 70);
    assert_eq!(v.extract_element(0)?, 1);
    assert_eq!(v.nvals()?, 3);
    Ok(())
}

#[test]
fn set_overwrites_most_recent_first() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(4)?;
    v.set_element(2, 1)?;
    v.set_element(2, 2)?;
    v.set_element(2, 3)?;
    assert_eq!(v.extract_element(2)?, 3);
    assert_eq!(v.nvals()?, 1);
    Ok(())
}

#[test]
fn delete_then_get_reports_no_value() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(5)?;
    v.set_element(1, 11)?;
    v.set_element(2, 22)?;
    v.remove_element(1)?;

    assert!(matches!(v.extract_element(1), Err(Error::NoValue)));
    assert_eq!(v.extract_element(2)?, 22);
    assert_eq!(v.nvals()?, 1);
    Ok(())
}

#[test]
fn remove_on_empty_is_noop() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(5)?;
    v.remove_element(3)?;
    assert_eq!(v.nvals()?, 0);
    Ok(())
}

#[test]
fn dup_has_value_semantics() -> anyhow::Result<()> {
    let mut a = Vector::<i64>::new(6)?;
    a.set_element(1, 10)?;
    let b = a.dup();

    a.set_element(1, 99)?;
    a.set_element(4, 4)?;

    assert_eq!(b.extract_element(1)?, 10);
    assert_eq!(b.nvals()?, 1);
    assert_eq!(a.extract_element(1)?, 99);
    assert_eq!(a.nvals()?, 2);

    // And the other direction.
    let mut c = b.dup();
    c.remove_element(1)?;
    assert_eq!(b.extract_element(1)?, 10);
    Ok(())
}

#[test]
fn build_sorts_and_rejects_duplicates_without_dup() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(8)?;
    v.build(&[5, 1, 3], &[50, 10, 30], None)?;
    let (idx, val) = v.extract_tuples()?;
    assert_eq!(idx, vec![1, 3, 5]);
    assert_eq!(val, vec![10, 30, 50]);

    let mut w = Vector::<i64>::new(8)?;
    assert!(matches!(
        w.build(&[1, 1], &[2, 3], None),
        Err(Error::InvalidValue)
    ));
    Ok(())
}

#[test]
fn build_folds_duplicates_under_plus() -> anyhow::Result<()> {
    // Scenario S2: size 5, I=[0,2,0,3,2,2], V=[1,10,1,5,10,10], dup=plus.
    let mut v = Vector::<i64>::new(5)?;
    v.build(
        &[0, 2, 0, 3, 2, 2],
        &[1, 10, 1, 5, 10, 10],
        Some(&ops::plus::<i64>()),
    )?;
    let (idx, val) = v.extract_tuples()?;
    assert_eq!(idx, vec![0, 2, 3]);
    assert_eq!(val, vec![2, 30, 5]);
    Ok(())
}

#[test]
fn build_requires_empty_output() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(5)?;
    v.set_element(0, 1)?;
    assert!(matches!(
        v.build(&[1], &[1], None),
        Err(Error::OutputNotEmpty)
    ));
    Ok(())
}

#[test]
fn bounds_are_validated_eagerly() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(4)?;
    assert!(matches!(
        v.set_element(4, 1),
        Err(Error::IndexOutOfBounds { index: 4, bound: 4 })
    ));
    assert!(matches!(
        v.extract_element(-1),
        Err(Error::IndexOutOfBounds { .. })
    ));
    // Failed validation leaves the handle unchanged.
    assert_eq!(v.nvals()?, 0);
    Ok(())
}

#[test]
fn resize_smaller_drops_entries_and_larger_keeps_them() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(10)?;
    v.build(&[1, 4, 8], &[1, 4, 8], None)?;

    v.resize(5)?;
    assert_eq!(v.size(), 5);
    let (idx, _) = v.extract_tuples()?;
    assert_eq!(idx, vec![1, 4]);

    v.resize(100)?;
    assert_eq!(v.size(), 100);
    assert_eq!(v.nvals()?, 2);
    Ok(())
}

#[test]
fn clear_keeps_shape() -> anyhow::Result<()> {
    let mut m = Matrix::<f64>::new(3, 7)?;
    m.set_element(1, 2, 1.5)?;
    m.clear();
    assert_eq!((m.nrows(), m.ncols()), (3, 7));
    assert_eq!(m.nvals()?, 0);
    Ok(())
}

#[test]
fn matrix_set_get_remove() -> anyhow::Result<()> {
    let mut m = Matrix::<i64>::new(4, 4)?;
    m.set_element(0, 3, 3)?;
    m.set_element(2, 1, 21)?;
    m.set_element(2, 1, 22)?;
    m.remove_element(0, 3)?;

    assert!(matches!(m.extract_element(0, 3), Err(Error::NoValue)));
    assert_eq!(m.extract_element(2, 1)?, 22);
    assert_eq!(m.nvals()?, 1);
    Ok(())
}

#[test]
fn matrix_build_row_major_tuples() -> anyhow::Result<()> {
    let mut m = Matrix::<i64>::new(3, 3)?;
    m.build(&[2, 0, 0], &[1, 2, 0], &[21, 2, 0], None)?;
    let (r, c, v) = m.extract_tuples()?;
    assert_eq!(r, vec![0, 0, 2]);
    assert_eq!(c, vec![0, 2, 1]);
    assert_eq!(v, vec![0, 2, 21]);
    Ok(())
}

#[test]
fn matrix_dup_is_independent() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(2, 2)?;
    a.set_element(0, 0, 1)?;
    let b = a.dup();
    a.set_element(0, 0, 2)?;
    a.set_element(1, 1, 3)?;
    assert_eq!(b.extract_element(0, 0)?, 1);
    assert_eq!(b.nvals()?, 1);
    Ok(())
}

#[test]
fn scalar_lifecycle() -> anyhow::Result<()> {
    let mut s = Scalar::<i64>::new();
    assert!(matches!(s.extract_element(), Err(Error::NoValue)));
    assert_eq!(s.nvals()?, 0);
    s.set_element(42);
    assert_eq!(s.extract_element()?, 42);
    assert_eq!(s.nvals()?, 1);
    let t = s.dup();
    s.clear();
    assert_eq!(t.extract_element()?, 42);
    Ok(())
}

#[test]
fn long_edit_chain_stays_consistent() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(64)?;
    for i in 0..64 {
        v.set_element(i, i)?;
    }
    for i in (0..64).step_by(2) {
        v.remove_element(i)?;
    }
    assert_eq!(v.nvals()?, 32);
    let (idx, val) = v.extract_tuples()?;
    assert_eq!(idx.len(), 32);
    assert!(idx.iter().all(|i| i % 2 == 1));
    assert!(idx.iter().zip(&val).all(|(i, v)| i == v));

    // Collapsing the chain does not change anything observable.
    v.wait(WaitMode::Materialize)?;
    let (idx2, val2) = v.extract_tuples()?;
    assert_eq!(idx, idx2);
    assert_eq!(val, val2);
    Ok(())
}
