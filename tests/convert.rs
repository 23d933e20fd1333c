//! End-to-end conversions. These need Chrome or Chromium on the machine:
//! `cargo test -- --ignored`.

use std::fs;
use std::process::Command;

const PAGE: &str = "<!doctype html><html><body><h1>Hello</h1><p>PDF test page</p></body></html>";

fn write_page(dir: &std::path::Path) -> std::path::PathBuf {
    let input = dir.join("page.html");
    fs::write(&input, PAGE).unwrap();
    input
}

/// Every `/MediaBox` in the file, as `[x0, y0, x1, y1]`.
fn media_boxes(pdf: &[u8]) -> Vec<Vec<f64>> {
    let text = String::from_utf8_lossy(pdf);
    text.match_indices("/MediaBox")
        .filter_map(|(at, _)| {
            let rest = &text[at..];
            let open = rest.find('[')?;
            let close = rest.find(']')?;
            rest[open + 1..close]
                .split_whitespace()
                .map(|n| n.parse().ok())
                .collect()
        })
        .collect()
}

#[test]
#[ignore = "needs a local Chrome/Chromium"]
fn writes_pdf_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_page(dir.path());
    let out_path = dir.path().join("page.pdf");

    let status = Command::new(env!("CARGO_BIN_EXE_htmltopdf"))
        .args(["--no-sandbox", "--output", out_path.to_str().unwrap()])
        .arg(&input)
        .status()
        .expect("run htmltopdf");
    assert!(status.success(), "htmltopdf failed");

    let bytes = fs::read(&out_path).expect("pdf missing");
    assert!(bytes.starts_with(b"%PDF-"));

    let boxes = media_boxes(&bytes);
    assert!(!boxes.is_empty(), "no page geometry");
    for b in boxes {
        let (w, h) = (b[2] - b[0], b[3] - b[1]);
        // A4 portrait is 595 x 842 pt
        assert!((w - 595.0).abs() < 2.0, "width {w}");
        assert!((h - 842.0).abs() < 2.0, "height {h}");
    }
}

#[test]
#[ignore = "needs a local Chrome/Chromium"]
fn streams_pdf_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_page(dir.path());

    let output = Command::new(env!("CARGO_BIN_EXE_htmltopdf"))
        .args(["--no-sandbox", "--margin-left=0", "--margin-top=0"])
        .arg(&input)
        .output()
        .expect("run htmltopdf");
    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.starts_with(b"%PDF-"));
    let tail = String::from_utf8_lossy(&output.stdout[output.stdout.len().saturating_sub(32)..]);
    assert!(tail.contains("%%EOF"));
}

#[test]
#[ignore = "needs a local Chrome/Chromium"]
fn same_input_gives_same_page_count() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_page(dir.path());

    let run = || {
        Command::new(env!("CARGO_BIN_EXE_htmltopdf"))
            .arg("--no-sandbox")
            .arg(&input)
            .output()
            .expect("run htmltopdf")
    };
    let (a, b) = (run(), run());
    assert!(a.status.success() && b.status.success());
    assert_eq!(media_boxes(&a.stdout).len(), media_boxes(&b.stdout).len());
}

const RED_BLOCK: &str = "<!doctype html><html style=\"margin:0\"><body style=\"margin:0\">\
<div style=\"background:#d00;height:40mm\"></div></body></html>";

type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m` applied in the space set up by `ctm`, as the `cm` operator does.
fn concat(m: Matrix, ctm: Matrix) -> Matrix {
    [
        m[0] * ctm[0] + m[1] * ctm[2],
        m[0] * ctm[1] + m[1] * ctm[3],
        m[2] * ctm[0] + m[3] * ctm[2],
        m[2] * ctm[1] + m[3] * ctm[3],
        m[4] * ctm[0] + m[5] * ctm[2] + ctm[4],
        m[4] * ctm[1] + m[5] * ctm[3] + ctm[5],
    ]
}

fn number(obj: &lopdf::Object) -> Option<f64> {
    match obj {
        lopdf::Object::Integer(i) => Some(*i as f64),
        lopdf::Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Left and top edge, in page points, of the first red fill on page one.
fn red_block_corner(pdf: &[u8]) -> (f64, f64) {
    let doc = lopdf::Document::load_mem(pdf).expect("parse pdf");
    let pages = doc.get_pages();
    let (_, &page) = pages.iter().next().expect("at least one page");
    let content = doc.get_page_content(page).expect("page content");
    let ops = lopdf::content::Content::decode(&content)
        .expect("decode content stream")
        .operations;

    let mut ctm = IDENTITY;
    let mut saved = Vec::new();
    let mut red = false;
    for op in ops {
        let n: Vec<f64> = op.operands.iter().filter_map(number).collect();
        match op.operator.as_str() {
            "q" => saved.push(ctm),
            "Q" => ctm = saved.pop().unwrap_or(IDENTITY),
            "cm" if n.len() == 6 => ctm = concat([n[0], n[1], n[2], n[3], n[4], n[5]], ctm),
            "rg" | "sc" | "scn" if n.len() == 3 => {
                red = n[0] > 0.7 && n[1] < 0.2 && n[2] < 0.2;
            }
            "re" if red && n.len() == 4 => {
                let corners = [
                    (n[0], n[1]),
                    (n[0] + n[2], n[1]),
                    (n[0], n[1] + n[3]),
                    (n[0] + n[2], n[1] + n[3]),
                ];
                let page_space = corners.map(|(x, y)| {
                    (
                        ctm[0] * x + ctm[2] * y + ctm[4],
                        ctm[1] * x + ctm[3] * y + ctm[5],
                    )
                });
                let left = page_space.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
                let top = page_space.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
                return (left, top);
            }
            _ => {}
        }
    }
    panic!("no red fill on the first page");
}

fn render_with_margins(input: &std::path::Path, left: &str, top: &str) -> Vec<u8> {
    let output = Command::new(env!("CARGO_BIN_EXE_htmltopdf"))
        .arg("--no-sandbox")
        .arg(format!("--margin-left={left}"))
        .arg(format!("--margin-top={top}"))
        .arg(input)
        .output()
        .expect("run htmltopdf");
    assert!(output.status.success(), "htmltopdf failed");
    output.stdout
}

#[test]
#[ignore = "needs a local Chrome/Chromium"]
fn margins_move_the_content_by_the_requested_millimetres() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("block.html");
    fs::write(&input, RED_BLOCK).unwrap();
    let pt_per_mm = 72.0 / 25.4;

    let (left0, top0) = red_block_corner(&render_with_margins(&input, "0", "0"));
    let (left1, top1) = red_block_corner(&render_with_margins(&input, "20", "15"));

    assert!(left0.abs() < 1.0, "content starts at {left0}pt with no left margin");
    let shift_right = left1 - left0;
    let shift_down = top0 - top1;
    assert!(
        (shift_right - 20.0 * pt_per_mm).abs() < 1.0,
        "left margin moved content {shift_right}pt"
    );
    assert!(
        (shift_down - 15.0 * pt_per_mm).abs() < 1.0,
        "top margin moved content {shift_down}pt"
    );
}
