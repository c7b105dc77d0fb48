use matrix_util::parquet::*;

#[test]
fn parquet_frame_keeps_text_and_numbers() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("frame.parquet");

    let mut frame = ParquetFrame::new(vec!["c1".into(), "c2".into(), "c3".into()]);
    frame.push_column(
        "cell_type",
        FrameColumn::Text(vec!["A549".into(), "K562".into(), "A549".into()]),
    )?;
    frame.push_column("dose", FrameColumn::Numeric(vec![0., 10., 1e4]))?;
    frame.push_column("x0", FrameColumn::Numeric(vec![0.5, -1.5, 2.25]))?;

    frame.to_parquet(&file, "cell")?;

    let names = peek_parquet_field_names(&file)?;
    assert_eq!(names.len(), 4);
    assert_eq!(names[0].as_ref(), "cell");

    let back = ParquetFrame::from_parquet(&file, None)?;
    assert_eq!(back.row_names, frame.row_names);
    assert_eq!(back.column_names, frame.column_names);
    assert_eq!(back.columns, frame.columns);
    assert_eq!(
        back.numeric_column_names(&["dose"]),
        vec![Box::<str>::from("x0")]
    );
    assert!(back.text_column("dose").is_none());
    assert_eq!(back.numeric_column("dose"), Some(&[0., 10., 1e4][..]));
    Ok(())
}

#[test]
fn frame_rejects_ragged_columns() {
    let mut frame = ParquetFrame::new(vec!["c1".into(), "c2".into()]);
    assert!(frame
        .push_column("x", FrameColumn::Numeric(vec![1.0]))
        .is_err());
    assert!(frame
        .push_column("x", FrameColumn::Numeric(vec![1.0, 2.0]))
        .is_ok());
    assert!(frame
        .push_column("x", FrameColumn::Numeric(vec![1.0, 2.0]))
        .is_err());
}
