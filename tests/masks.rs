use ferroblas::*;

fn dense_bool(size: Ix, value: bool) -> anyhow::Result<Vector<bool>> {
    let mut v = Vector::<bool>::new(size)?;
    let idx: Vec<Ix> = (0..size).collect();
    let val = vec![value; size as usize];
    v.build(&idx, &val, None)?;
    Ok(v)
}

fn tuples(v: &Vector<i64>) -> anyhow::Result<Vec<(Ix, i64)>> {
    let (i, x) = v.extract_tuples()?;
    Ok(i.into_iter().zip(x).collect())
}

#[test]
fn masked_assign_constant_with_replace() -> anyhow::Result<()> {
    // Scenario S3: w = [1,2,3,4]; structural mask at {1,3}; assign 9 to
    // all(4) with replace.
    let mut w = Vector::<i64>::new(4)?;
    w.build(&[0, 1, 2, 3], &[1, 2, 3, 4], None)?;

    let mut m = Vector::<bool>::new(4)?;
    m.set_element(1, true)?;
    m.set_element(3, false)?; // value irrelevant for a structural mask

    w.assign_constant(
        Some(&m.as_structure()),
        None,
        9,
        &all(4),
        Descriptor::new().with_replace(),
    )?;

    assert_eq!(tuples(&w)?, vec![(1, 9), (3, 9)]);
    Ok(())
}

#[test]
fn all_true_mask_without_replace_is_identity() -> anyhow::Result<()> {
    let mut u = Vector::<i64>::new(6)?;
    u.build(&[0, 2, 5], &[1, 2, 3], None)?;
    let mut v = Vector::<i64>::new(6)?;
    v.build(&[2, 3], &[20, 30], None)?;

    let mut plain = Vector::<i64>::new(6)?;
    plain.ewise_add(None, None, &ops::plus::<i64>(), &u, &v, Descriptor::new())?;

    let mask = dense_bool(6, true)?;
    let mut masked = Vector::<i64>::new(6)?;
    masked.ewise_add(
        Some(&mask.as_mask()),
        None,
        &ops::plus::<i64>(),
        &u,
        &v,
        Descriptor::new(),
    )?;

    assert_eq!(tuples(&plain)?, tuples(&masked)?);
    Ok(())
}

#[test]
fn complement_equals_structural_complement() -> anyhow::Result<()> {
    let size = 8;
    let mut u = Vector::<i64>::new(size)?;
    u.build(&[0, 1, 3, 4, 6, 7], &[1, 2, 3, 4, 5, 6], None)?;

    let mut m = Vector::<bool>::new(size)?;
    m.build(&[1, 4, 5], &[true, true, true], None)?;

    // Explicit structural complement of m.
    let mut mc = Vector::<bool>::new(size)?;
    let comp: Vec<Ix> = (0..size)
        .filter(|i| ![1, 4, 5].contains(i))
        .collect();
    mc.build(&comp, &vec![true; comp.len()], None)?;

    let desc = Descriptor::new().with_replace();
    let mut a = Vector::<i64>::new(size)?;
    a.apply(
        Some(&m.as_structure()),
        None,
        &ops::identity::<i64>(),
        &u,
        desc.with_complement(),
    )?;

    let mut b = Vector::<i64>::new(size)?;
    b.apply(
        Some(&mc.as_structure()),
        None,
        &ops::identity::<i64>(),
        &u,
        desc,
    )?;

    assert_eq!(tuples(&a)?, tuples(&b)?);
    Ok(())
}

#[test]
fn value_mask_respects_stored_booleans() -> anyhow::Result<()> {
    let mut u = Vector::<i64>::new(4)?;
    u.build(&[0, 1, 2, 3], &[10, 11, 12, 13], None)?;

    // Entries at 0..=2; the one at 1 is false.
    let mut m = Vector::<bool>::new(4)?;
    m.build(&[0, 1, 2], &[true, false, true], None)?;

    let mut w = Vector::<i64>::new(4)?;
    w.apply(
        Some(&m.as_mask()),
        None,
        &ops::identity::<i64>(),
        &u,
        Descriptor::new().with_replace(),
    )?;
    assert_eq!(tuples(&w)?, vec![(0, 10), (2, 12)]);

    // Structure flag admits the false entry too.
    let mut w2 = Vector::<i64>::new(4)?;
    w2.apply(
        Some(&m.as_mask()),
        None,
        &ops::identity::<i64>(),
        &u,
        Descriptor::new().with_replace().with_structure(),
    )?;
    assert_eq!(tuples(&w2)?, vec![(0, 10), (1, 11), (2, 12)]);
    Ok(())
}

#[test]
fn numeric_value_mask_uses_nonzero_test() -> anyhow::Result<()> {
    let mut u = Vector::<i64>::new(5)?;
    u.build(&[0, 1, 2, 3, 4], &[1, 2, 3, 4, 5], None)?;

    let mut m = Vector::<i64>::new(5)?;
    m.build(&[0, 1, 3], &[7, 0, -2], None)?;

    let mut w = Vector::<i64>::new(5)?;
    w.apply(
        Some(&m.as_mask()),
        None,
        &ops::identity::<i64>(),
        &u,
        Descriptor::new().with_replace(),
    )?;
    // Index 1 has a stored zero: admitted structurally, not by value.
    assert_eq!(tuples(&w)?, vec![(0, 1), (3, 4)]);
    Ok(())
}

#[test]
fn unmasked_positions_keep_prior_without_replace() -> anyhow::Result<()> {
    let mut w = Vector::<i64>::new(4)?;
    w.build(&[0, 1, 2, 3], &[1, 2, 3, 4], None)?;

    let mut m = Vector::<bool>::new(4)?;
    m.build(&[1, 2], &[true, true], None)?;

    let mut u = Vector::<i64>::new(4)?;
    u.build(&[0, 1, 2, 3], &[100, 200, 300, 400], None)?;

    w.apply(
        Some(&m.as_mask()),
        None,
        &ops::identity::<i64>(),
        &u,
        Descriptor::new(),
    )?;
    // Masked-in positions take the new value; the rest keep the prior one.
    assert_eq!(tuples(&w)?, vec![(0, 1), (1, 200), (2, 300), (3, 4)]);
    Ok(())
}

#[test]
fn matrix_mask_complement_duality() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(3, 3)?;
    a.build(&[0, 0, 1, 2, 2], &[0, 2, 1, 0, 2], &[1, 2, 3, 4, 5], None)?;

    let mut m = Matrix::<bool>::new(3, 3)?;
    m.build(&[0, 1, 2], &[0, 1, 2], &[true, true, true], None)?;

    let mut mc = Matrix::<bool>::new(3, 3)?;
    let mut rr = Vec::new();
    let mut cc = Vec::new();
    for r in 0..3 {
        for c in 0..3 {
            if r != c {
                rr.push(r);
                cc.push(c);
            }
        }
    }
    mc.build(&rr, &cc, &vec![true; rr.len()], None)?;

    let desc = Descriptor::new().with_replace();
    let mut x = Matrix::<i64>::new(3, 3)?;
    x.apply(
        Some(&m.as_structure()),
        None,
        &ops::identity::<i64>(),
        &a,
        desc.with_complement(),
    )?;
    let mut y = Matrix::<i64>::new(3, 3)?;
    y.apply(
        Some(&mc.as_structure()),
        None,
        &ops::identity::<i64>(),
        &a,
        desc,
    )?;

    assert_eq!(x.extract_tuples()?, y.extract_tuples()?);
    Ok(())
}

#[test]
fn mask_dimension_mismatch_is_rejected() -> anyhow::Result<()> {
    let mut w = Vector::<i64>::new(4)?;
    let u = Vector::<i64>::new(4)?;
    let m = dense_bool(5, true)?;
    let err = w.apply(
        Some(&m.as_mask()),
        None,
        &ops::identity::<i64>(),
        &u,
        Descriptor::new(),
    );
    assert!(matches!(err, Err(Error::DimensionMismatch { .. })));
    Ok(())
}
