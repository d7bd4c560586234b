//! End-to-end tests through the operation engine

use pdf_tools_mcp::engine::output::{InputFile, OperationOutput};
use pdf_tools_mcp::engine::{Clock, Engine, EngineConfig, Operation};
use pdf_tools_mcp::pdf::document::document_with_pages;
use pdf_tools_mcp::pdf::{Document, Margins, PageSize, PageSpec, SaveOptions};
use pdf_tools_mcp::Error;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn engine() -> Engine {
    Engine::new(EngineConfig {
        clock: Clock::Fixed(1_700_000_000_000),
        ..EngineConfig::default()
    })
}

/// A PDF whose page `i` is `100 + i` points wide, so pages can be told apart by width
fn numbered_pdf(name: &str, pages: usize, first_width: f64) -> InputFile {
    let sizes: Vec<(f64, f64)> = (0..pages)
        .map(|i| (first_width + i as f64, 500.0))
        .collect();
    let data = document_with_pages(&sizes)
        .unwrap()
        .serialize(SaveOptions::default())
        .unwrap();
    InputFile::new(name, data)
}

fn single(output: OperationOutput) -> Document {
    match output {
        OperationOutput::Single(file) => Document::load(&file.data).unwrap(),
        other => panic!("expected a single output, got {:?}", other.files().len()),
    }
}

fn widths(doc: &Document) -> Vec<f64> {
    doc.pages_info().unwrap().iter().map(|p| p.width).collect()
}

fn rotations(doc: &Document) -> Vec<u16> {
    doc.pages_info().unwrap().iter().map(|p| p.rotation).collect()
}

#[rstest]
#[case(vec![1, 2, 3, 4])]
#[case(vec![4, 3, 2, 1])]
#[case(vec![2, 4, 1, 3])]
fn test_organize_permutation_keeps_page_count(#[case] order: Vec<u32>) {
    let input = numbered_pdf("doc.pdf", 4, 100.0);
    let out = single(
        engine()
            .execute(
                &Operation::OrganizePages {
                    order: PageSpec::List(order.clone()),
                },
                &[input],
            )
            .unwrap(),
    );
    assert_eq!(out.page_count().unwrap(), 4);
    let expected: Vec<f64> = order.iter().map(|&n| 99.0 + n as f64).collect();
    assert_eq!(widths(&out), expected);
}

#[rstest]
#[case(90, 90)]
#[case(270, 180)]
#[case(-90, 180)]
#[case(450, -360)]
fn test_rotation_composes_additively(#[case] a: i64, #[case] b: i64) {
    let engine = engine();
    let input = numbered_pdf("doc.pdf", 2, 100.0);

    let once = engine
        .execute(&Operation::Rotate { degrees: a, pages: None }, &[input.clone()])
        .unwrap()
        .into_files()
        .remove(0);
    let twice = single(
        engine
            .execute(
                &Operation::Rotate { degrees: b, pages: None },
                &[InputFile::new("doc.pdf", once.data)],
            )
            .unwrap(),
    );
    let combined = single(
        engine
            .execute(&Operation::Rotate { degrees: a + b, pages: None }, &[input])
            .unwrap(),
    );
    assert_eq!(rotations(&twice), rotations(&combined));
    let expected = (a + b).rem_euclid(360) as u16;
    assert_eq!(rotations(&combined), vec![expected, expected]);
}

#[test]
fn test_merge_preserves_input_order() {
    let a = numbered_pdf("a.pdf", 2, 100.0);
    let b = numbered_pdf("b.pdf", 3, 200.0);
    let merged = single(engine().execute(&Operation::Merge, &[a, b]).unwrap());
    assert_eq!(widths(&merged), vec![100.0, 101.0, 200.0, 201.0, 202.0]);
}

#[test]
fn test_split_then_merge_restores_structure() {
    let engine = engine();
    let input = numbered_pdf("doc.pdf", 3, 100.0);
    let rotated = engine
        .execute(
            &Operation::Rotate {
                degrees: 90,
                pages: Some(PageSpec::List(vec![2])),
            },
            &[input],
        )
        .unwrap()
        .into_files()
        .remove(0);
    let original = Document::load(&rotated.data).unwrap();

    let parts: Vec<InputFile> = engine
        .execute(&Operation::Split, &[InputFile::new("doc.pdf", rotated.data.clone())])
        .unwrap()
        .into_files()
        .into_iter()
        .map(|f| InputFile::new(f.name, f.data))
        .collect();
    assert_eq!(parts.len(), 3);

    let merged = single(engine.execute(&Operation::Merge, &parts).unwrap());
    assert_eq!(merged.page_count().unwrap(), original.page_count().unwrap());
    for (got, want) in merged
        .pages_info()
        .unwrap()
        .iter()
        .zip(original.pages_info().unwrap().iter())
    {
        assert_eq!((got.width, got.height, got.rotation), (want.width, want.height, want.rotation));
    }
}

#[rstest]
#[case(vec![1])]
#[case(vec![2, 4])]
#[case(vec![1, 3, 5])]
#[case(vec![5, 4, 3, 2])]
fn test_extract_and_delete_are_complements(#[case] selection: Vec<u32>) {
    let engine = engine();
    let input = numbered_pdf("doc.pdf", 5, 100.0);
    let extracted = single(
        engine
            .execute(
                &Operation::ExtractPages {
                    pages: PageSpec::List(selection.clone()),
                },
                &[input.clone()],
            )
            .unwrap(),
    );
    let remaining = single(
        engine
            .execute(
                &Operation::DeletePages {
                    pages: PageSpec::List(selection),
                },
                &[input],
            )
            .unwrap(),
    );

    let kept = widths(&extracted);
    let left = widths(&remaining);
    assert!(kept.iter().all(|w| !left.contains(w)));
    let mut all: Vec<f64> = kept.into_iter().chain(left).collect();
    all.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(all, vec![100.0, 101.0, 102.0, 103.0, 104.0]);
}

#[rstest]
#[case(Margins { top: 0.0, right: 50.0, bottom: 0.0, left: 49.0 }, true)]
#[case(Margins { top: 0.0, right: 50.0, bottom: 0.0, left: 50.0 }, false)]
#[case(Margins { top: 250.0, right: 0.0, bottom: 249.0, left: 0.0 }, true)]
#[case(Margins { top: 250.0, right: 0.0, bottom: 250.0, left: 0.0 }, false)]
#[case(Margins { top: 300.0, right: 0.0, bottom: 300.0, left: 0.0 }, false)]
fn test_crop_validation_boundary(#[case] margins: Margins, #[case] succeeds: bool) {
    // Narrowest page is 100 wide, all pages are 500 high
    let input = numbered_pdf("doc.pdf", 3, 100.0);
    let result = engine().execute(&Operation::Crop { margins }, &[input]);
    match result {
        Ok(output) => {
            assert!(succeeds, "crop should have been rejected");
            let doc = single(output);
            let first = doc.page_info(0).unwrap();
            assert_eq!(first.crop_box.width, 100.0 - margins.left - margins.right);
            assert_eq!(first.crop_box.height, 500.0 - margins.top - margins.bottom);
        }
        Err(e) => {
            assert!(!succeeds, "crop failed unexpectedly: {}", e);
            assert!(matches!(e, Error::Validation { .. }));
        }
    }
}

#[rstest]
#[case(&[(100.0, 100.0)])]
#[case(&[(612.0, 792.0), (842.0, 595.0)])]
#[case(&[(2000.0, 50.0), (595.0, 842.0), (10.0, 10.0)])]
fn test_resize_to_a4_is_exact(#[case] sizes: &[(f64, f64)]) {
    let data = document_with_pages(sizes)
        .unwrap()
        .serialize(SaveOptions::default())
        .unwrap();
    let out = single(
        engine()
            .execute(
                &Operation::Resize {
                    page_size: PageSize::A4,
                },
                &[InputFile::new("doc.pdf", data)],
            )
            .unwrap(),
    );
    for page in out.pages_info().unwrap() {
        assert_eq!((page.width, page.height), (595.0, 842.0));
    }
}

#[test]
fn test_extract_pages_three_then_one() {
    let input = numbered_pdf("doc.pdf", 3, 100.0);
    let out = single(
        engine()
            .execute(
                &Operation::ExtractPages {
                    pages: PageSpec::List(vec![3, 1]),
                },
                &[input],
            )
            .unwrap(),
    );
    assert_eq!(widths(&out), vec![102.0, 100.0]);
}

#[test]
fn test_cannot_delete_only_page() {
    let input = numbered_pdf("doc.pdf", 1, 100.0);
    let err = engine()
        .execute(
            &Operation::DeletePages {
                pages: PageSpec::List(vec![1]),
            },
            &[input],
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[test]
fn test_split_names_pages_after_source() {
    let input = numbered_pdf("report.pdf", 5, 100.0);
    let files = engine()
        .execute(&Operation::Split, &[input])
        .unwrap()
        .into_files();
    let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
    assert_eq!(
        names,
        (1..=5)
            .map(|n| format!("report_page_{}.pdf", n))
            .collect::<Vec<_>>()
    );
    for file in &files {
        assert_eq!(Document::load(&file.data).unwrap().page_count().unwrap(), 1);
    }
}

#[test]
fn test_range_expression_selects_from_end() {
    let input = numbered_pdf("doc.pdf", 4, 100.0);
    let out = single(
        engine()
            .execute(
                &Operation::ExtractPages {
                    pages: PageSpec::from("z,r2,1"),
                },
                &[input],
            )
            .unwrap(),
    );
    assert_eq!(widths(&out), vec![103.0, 102.0, 100.0]);
}
