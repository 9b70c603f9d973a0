//! Saved notebooks must be readable by other tools that follow the
//! notebook format. The `nbformat` crate acts as an independent reader.

use notebook_doc::{parse_notebook, serialize_notebook, CellKind, NotebookDocument, OutputRecord};

#[test]
fn test_new_notebook_parses_with_nbformat() {
    let mut doc = NotebookDocument::new();
    let code = doc.insert_cell(None, CellKind::Code).unwrap();
    doc.set_cell_source(code, "x = 1\nprint(x)\n").unwrap();
    doc.record_execution(code, vec![OutputRecord::stdout("1\n")], true)
        .unwrap();
    let md = doc.insert_cell(Some(code), CellKind::Markdown).unwrap();
    doc.set_cell_source(md, "# Notes").unwrap();

    let json = serialize_notebook(&doc).unwrap();

    let parsed = nbformat::parse_notebook(&json).expect("nbformat should accept saved notebook");
    match parsed {
        nbformat::Notebook::V4(nb) => {
            assert_eq!(nb.nbformat, 4);
            assert_eq!(nb.nbformat_minor, 5);
            assert_eq!(nb.cells.len(), 2);
            assert_eq!(nb.cells[0].source().join(""), "x = 1\nprint(x)\n");
            assert_eq!(nb.cells[1].source().join(""), "# Notes");
        }
        _ => panic!("Expected a v4.5 notebook"),
    }
}

#[test]
fn test_roundtrip_through_our_reader_is_lossless() {
    let mut doc = NotebookDocument::new();
    doc.insert_cell(None, CellKind::Code).unwrap();
    doc.set_cell_source(0, "for i in range(3):\n    print(i)\n").unwrap();
    doc.record_execution(0, vec![OutputRecord::stdout("0\n1\n2\n")], true)
        .unwrap();

    let reloaded = parse_notebook(&serialize_notebook(&doc).unwrap()).unwrap();

    assert_eq!(reloaded.cells(), doc.cells());
    assert_eq!(reloaded.metadata, doc.metadata);
    assert_eq!(reloaded.format, doc.format);
}
