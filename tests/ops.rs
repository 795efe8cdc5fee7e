use ferroblas::*;

fn vec_of(size: Ix, entries: &[(Ix, i64)]) -> anyhow::Result<Vector<i64>> {
    let mut v = Vector::<i64>::new(size)?;
    let (idx, val): (Vec<_>, Vec<_>) = entries.iter().copied().unzip();
    v.build(&idx, &val, None)?;
    Ok(v)
}

fn tuples(v: &Vector<i64>) -> anyhow::Result<Vec<(Ix, i64)>> {
    let (i, x) = v.extract_tuples()?;
    Ok(i.into_iter().zip(x).collect())
}

#[test]
fn apply_unary_maps_values() -> anyhow::Result<()> {
    let u = vec_of(5, &[(0, 1), (3, -4)])?;
    let mut w = Vector::<i64>::new(5)?;
    w.apply(None, None, &UnaryOp::new(|x: &i64| x * 10), &u, Descriptor::new())?;
    assert_eq!(tuples(&w)?, vec![(0, 10), (3, -40)]);
    Ok(())
}

#[test]
fn apply_bind_first_and_second() -> anyhow::Result<()> {
    let u = vec_of(4, &[(1, 5), (2, 7)])?;
    let s = Scalar::from_value(100);

    let mut w = Vector::<i64>::new(4)?;
    w.apply_bind_first(None, None, &ops::minus::<i64>(), &s, &u, Descriptor::new())?;
    assert_eq!(tuples(&w)?, vec![(1, 95), (2, 93)]);

    let mut x = Vector::<i64>::new(4)?;
    x.apply_bind_second(None, None, &ops::minus::<i64>(), &u, &s, Descriptor::new())?;
    assert_eq!(tuples(&x)?, vec![(1, -95), (2, -93)]);
    Ok(())
}

#[test]
fn apply_bound_empty_scalar_fails_at_read_time() -> anyhow::Result<()> {
    let u = vec_of(4, &[(1, 5)])?;
    let s = Scalar::<i64>::new();
    let mut w = Vector::<i64>::new(4)?;
    // Construction succeeds; the failure is deferred.
    w.apply_bind_second(None, None, &ops::plus::<i64>(), &u, &s, Descriptor::new())?;
    assert!(matches!(w.extract_tuples(), Err(Error::EmptyObject)));
    assert!(matches!(w.extract_element(1), Err(Error::EmptyObject)));
    Ok(())
}

#[test]
fn apply_index_sees_coordinates() -> anyhow::Result<()> {
    let u = vec_of(6, &[(0, 7), (4, 7)])?;
    let mut w = Vector::<i64>::new(6)?;
    w.apply_index(None, None, &ops::row_index::<i64>(), &u, 1, Descriptor::new())?;
    assert_eq!(tuples(&w)?, vec![(0, 1), (4, 5)]);
    Ok(())
}

#[test]
fn select_filters_by_predicate() -> anyhow::Result<()> {
    let u = vec_of(6, &[(0, -1), (2, 5), (4, 0), (5, 9)])?;
    let mut w = Vector::<i64>::new(6)?;
    w.select(None, None, &ops::value_gt::<i64>(), &u, 0, Descriptor::new())?;
    assert_eq!(tuples(&w)?, vec![(2, 5), (5, 9)]);
    Ok(())
}

#[test]
fn select_tril_on_matrix() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(3, 3)?;
    a.build(
        &[0, 0, 1, 1, 2, 2],
        &[0, 2, 0, 1, 1, 2],
        &[1, 2, 3, 4, 5, 6],
        None,
    )?;
    let mut l = Matrix::<i64>::new(3, 3)?;
    l.select(None, None, &ops::tril::<i64>(), &a, 0, Descriptor::new())?;
    let (r, c, v) = l.extract_tuples()?;
    assert_eq!(r, vec![0, 1, 1, 2, 2]);
    assert_eq!(c, vec![0, 0, 1, 1, 2]);
    assert_eq!(v, vec![1, 3, 4, 5, 6]);
    Ok(())
}

#[test]
fn ewise_add_is_union_and_mult_is_intersection() -> anyhow::Result<()> {
    let u = vec_of(6, &[(0, 1), (2, 2), (4, 3)])?;
    let v = vec_of(6, &[(2, 10), (3, 20), (4, 30)])?;

    let mut sum = Vector::<i64>::new(6)?;
    sum.ewise_add(None, None, &ops::plus::<i64>(), &u, &v, Descriptor::new())?;
    assert_eq!(tuples(&sum)?, vec![(0, 1), (2, 12), (3, 20), (4, 33)]);

    let mut prod = Vector::<i64>::new(6)?;
    prod.ewise_mult(None, None, &ops::times::<i64>(), &u, &v, Descriptor::new())?;
    assert_eq!(tuples(&prod)?, vec![(2, 20), (4, 90)]);
    Ok(())
}

#[test]
fn assign_with_list_remaps_and_keeps_outside() -> anyhow::Result<()> {
    let mut w = vec_of(6, &[(0, 1), (1, 2), (5, 6)])?;
    let u = vec_of(2, &[(0, 100), (1, 200)])?;
    // w([4, 1]) = u: unsorted index list exercises the sort path.
    w.assign(None, None, &u, &[4, 1], Descriptor::new())?;
    assert_eq!(tuples(&w)?, vec![(0, 1), (1, 200), (4, 100), (5, 6)]);
    Ok(())
}

#[test]
fn assign_region_gap_deletes_when_source_has_no_entry() -> anyhow::Result<()> {
    let mut w = vec_of(4, &[(0, 1), (1, 2), (2, 3)])?;
    let u = Vector::<i64>::new(2)?; // empty source
    w.assign(None, None, &u, &[0, 2], Descriptor::new())?;
    // Inside the region the (empty) source wins; outside it nothing moves.
    assert_eq!(tuples(&w)?, vec![(1, 2)]);
    Ok(())
}

#[test]
fn full_unmasked_assign_adopts_the_source() -> anyhow::Result<()> {
    let mut w = vec_of(3, &[(0, 9)])?;
    let u = vec_of(3, &[(1, 5), (2, 6)])?;
    w.assign(None, None, &u, &all(3), Descriptor::new())?;
    assert_eq!(tuples(&w)?, vec![(1, 5), (2, 6)]);
    Ok(())
}

#[test]
fn assign_scalar_empty_deletes_region() -> anyhow::Result<()> {
    let mut w = vec_of(5, &[(0, 1), (1, 2), (2, 3), (4, 5)])?;
    let empty = Scalar::<i64>::new();
    w.assign_scalar(None, None, &empty, &[1, 2], Descriptor::new())?;
    assert_eq!(tuples(&w)?, vec![(0, 1), (4, 5)]);
    Ok(())
}

#[test]
fn extract_with_permutation_restores_order() -> anyhow::Result<()> {
    let u = vec_of(6, &[(0, 10), (2, 12), (3, 13), (5, 15)])?;
    let mut w = Vector::<i64>::new(3)?;
    // w[j] = u[I[j]] with I = [5, 0, 3].
    w.extract(None, None, &u, &[5, 0, 3], Descriptor::new())?;
    assert_eq!(tuples(&w)?, vec![(0, 15), (1, 10), (2, 13)]);
    Ok(())
}

#[test]
fn extract_with_repeats_fans_out() -> anyhow::Result<()> {
    let u = vec_of(4, &[(1, 11)])?;
    let mut w = Vector::<i64>::new(3)?;
    w.extract(None, None, &u, &[1, 1, 2], Descriptor::new())?;
    assert_eq!(tuples(&w)?, vec![(0, 11), (1, 11)]);
    Ok(())
}

#[test]
fn extract_col_pulls_a_matrix_column() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(4, 3)?;
    a.build(&[0, 1, 2, 3], &[1, 1, 0, 1], &[1, 2, 3, 4], None)?;
    let mut w = Vector::<i64>::new(4)?;
    w.extract_col(None, None, &a, &all(4), 1, Descriptor::new())?;
    assert_eq!(tuples(&w)?, vec![(0, 1), (1, 2), (3, 4)]);

    // Transposed input reads a row instead.
    let mut x = Vector::<i64>::new(3)?;
    x.extract_col(
        None,
        None,
        &a,
        &all(3),
        2,
        Descriptor::new().with_transpose0(),
    )?;
    assert_eq!(tuples(&x)?, vec![(0, 3)]);
    Ok(())
}

#[test]
fn matrix_assign_submatrix() -> anyhow::Result<()> {
    let mut c = Matrix::<i64>::new(4, 4)?;
    c.build(&[0, 3], &[0, 3], &[1, 16], None)?;
    let mut a = Matrix::<i64>::new(2, 2)?;
    a.build(&[0, 1], &[0, 1], &[100, 200], None)?;

    c.assign(None, None, &a, &[1, 2], &[1, 2], Descriptor::new())?;
    let (r, cc, v) = c.extract_tuples()?;
    assert_eq!(r, vec![0, 1, 2, 3]);
    assert_eq!(cc, vec![0, 1, 2, 3]);
    assert_eq!(v, vec![1, 100, 200, 16]);
    Ok(())
}

#[test]
fn row_assign_touches_only_its_row() -> anyhow::Result<()> {
    let mut c = Matrix::<i64>::new(3, 3)?;
    c.build(&[0, 1, 2], &[0, 1, 2], &[1, 2, 3], None)?;
    let u = vec_of(3, &[(0, 7), (2, 9)])?;

    // Even with replace, rows other than 1 keep their entries; within row 1
    // the region covers all columns, so the old (1,1) entry is overwritten
    // by the source's absence there.
    c.assign_row(None, None, &u, 1, &all(3), Descriptor::new().with_replace())?;
    let (r, cc, v) = c.extract_tuples()?;
    assert_eq!(r, vec![0, 1, 1, 2]);
    assert_eq!(cc, vec![0, 0, 2, 2]);
    assert_eq!(v, vec![1, 7, 9, 3]);
    Ok(())
}

#[test]
fn col_assign_touches_only_its_column() -> anyhow::Result<()> {
    let mut c = Matrix::<i64>::new(3, 3)?;
    c.build(&[0, 1, 2], &[0, 1, 2], &[1, 2, 3], None)?;
    let u = vec_of(2, &[(0, 5), (1, 6)])?;

    c.assign_col(None, None, &u, &[0, 2], 1, Descriptor::new())?;
    let (r, cc, v) = c.extract_tuples()?;
    assert_eq!(r, vec![0, 0, 1, 2, 2]);
    assert_eq!(cc, vec![0, 1, 1, 1, 2]);
    assert_eq!(v, vec![1, 5, 2, 6, 3]);
    Ok(())
}

#[test]
fn matrix_extract_submatrix() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(3, 3)?;
    a.build(
        &[0, 0, 1, 1, 2],
        &[0, 2, 1, 2, 0],
        &[1, 2, 3, 4, 5],
        None,
    )?;
    let mut c = Matrix::<i64>::new(2, 2)?;
    c.extract(None, None, &a, &[1, 2], &[0, 2], Descriptor::new())?;
    let (r, cc, v) = c.extract_tuples()?;
    assert_eq!(r, vec![0, 1]);
    assert_eq!(cc, vec![1, 0]);
    assert_eq!(v, vec![4, 5]);
    Ok(())
}

#[test]
fn accumulator_composes_like_two_assigns() -> anyhow::Result<()> {
    // With a commutative accumulator and disjoint sources, one accumulated
    // step equals two composed assigns.
    let base = vec_of(6, &[(0, 1), (2, 3)])?;
    let extra = vec_of(6, &[(1, 10), (4, 40)])?;

    let mut one_step = base.dup();
    one_step.assign(
        None,
        Some(&ops::plus::<i64>()),
        &extra,
        &all(6),
        Descriptor::new(),
    )?;

    let mut two_steps = base.dup();
    let merged: Vec<(Ix, i64)> = {
        let mut m = tuples(&base)?;
        m.extend(tuples(&extra)?);
        m.sort();
        m
    };
    let (idx, val): (Vec<_>, Vec<_>) = merged.into_iter().unzip();
    let mut expected = Vector::<i64>::new(6)?;
    expected.build(&idx, &val, None)?;
    two_steps.assign(None, None, &expected, &all(6), Descriptor::new())?;

    assert_eq!(tuples(&one_step)?, tuples(&two_steps)?);
    Ok(())
}

#[test]
fn accum_keeps_prior_where_source_is_absent() -> anyhow::Result<()> {
    let mut w = vec_of(4, &[(0, 1), (1, 2)])?;
    let u = vec_of(4, &[(1, 10), (3, 30)])?;
    w.ewise_add(
        None,
        Some(&ops::plus::<i64>()),
        &ops::plus::<i64>(),
        &u,
        &Vector::<i64>::new(4)?,
        Descriptor::new(),
    )?;
    // t = u (union with empty); accum folds into the prior content.
    assert_eq!(tuples(&w)?, vec![(0, 1), (1, 12), (3, 30)]);
    Ok(())
}

#[test]
fn dimension_mismatches_are_rejected_eagerly() -> anyhow::Result<()> {
    let mut w = Vector::<i64>::new(4)?;
    let u = Vector::<i64>::new(5)?;
    assert!(matches!(
        w.apply(None, None, &ops::identity::<i64>(), &u, Descriptor::new()),
        Err(Error::DimensionMismatch { .. })
    ));
    // The failed call left the output untouched.
    assert_eq!(w.nvals()?, 0);
    Ok(())
}
