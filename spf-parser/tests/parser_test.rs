use spf_parser::spf::{AttributeValue, MvdOptions, OptionValue};
use spf_parser::{Diagnostic, Error, SpfFile, SpfParser};

const VALID: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [ReferenceView_V1.2, Alignment]','Option [Split: true]'),'2;1');
FILE_NAME('model.ifc','2024-05-01T10:00:00',('Alice'),('ACME'),'exporter 1.0','','none');
FILE_SCHEMA(('IFC4X3_ADD2'));
ENDSEC;
DATA;
/* site and a person, nothing else */
#1=IFCPERSON($,$,'Alice',$,$,$,$,$);
#2=IFCSITE('2bXv0p7xj3FeStu7xlbkbY',#1,$,$,$,#3,$,$,.ELEMENT.,$,$,$,$,$);
#3=IFCLOCALPLACEMENT($,#4);
#4=IFCAXIS2PLACEMENT3D(#5,$,$);
#5=IFCCARTESIANPOINT((0.,0.,0.));
ENDSEC;
END-ISO-10303-21;
";

#[test]
fn test_valid_file_round_trip() {
    let file: SpfFile = VALID.parse().unwrap();

    assert_eq!(file.get_entities().len(), 5);
    assert_eq!(file.by_id(1).unwrap().get_type(), Some("IFCPERSON"));
    assert_eq!(
        file.by_id(1).unwrap().get_attributes()[2],
        AttributeValue::String("Alice".to_string())
    );

    let sites = file.by_type("IfcSite");
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].get_id(), 2);

    let header = file.get_header();
    assert_eq!(header.file_name.name, "model.ifc");
    assert_eq!(header.file_name.author, vec!["Alice"]);
    assert_eq!(header.file_description.implementation_level, "2;1");

    assert_eq!(file.schema_identifier(), Some("IFC4X3_ADD2"));
    assert_eq!(file.schema().unwrap(), "IFC4X3");
    assert_eq!(file.schema_version(), (4, 3, 2, 0));
}

#[test]
fn test_point_coordinates_are_reals() {
    let file: SpfFile = VALID.parse().unwrap();
    match &file.by_id(5).unwrap().get_attributes()[0] {
        AttributeValue::List(coords) => {
            assert_eq!(coords.len(), 3);
            assert!(coords
                .iter()
                .all(|c| matches!(c, AttributeValue::Real(v) if *v == 0.0)));
        }
        other => panic!("unexpected attribute {:?}", other),
    }
}

#[test]
fn test_mvd_from_parsed_header() {
    let mut file: SpfFile = VALID.parse().unwrap();
    let mut mvd = file.mvd();

    let views = mvd.view_definitions().unwrap();
    assert_eq!(&*views, &["ReferenceView_V1.2", "Alignment"]);

    match mvd.options().unwrap() {
        MvdOptions::Map(map) => {
            assert_eq!(
                map.get("Split"),
                Some(&OptionValue::Single("true".to_string()))
            );
        }
        MvdOptions::Text(text) => panic!("expected option map, got {:?}", text),
    }
}

#[test]
fn test_mvd_mutation_is_visible_through_header() {
    let mut file: SpfFile = VALID.parse().unwrap();
    {
        let mut mvd = file.mvd();
        let mut views = mvd.view_definitions().unwrap();
        views.push("StructuralAnalysisView");
    }

    assert_eq!(
        file.get_header().file_description.description[0],
        "ViewDefinition [ReferenceView_V1.2,Alignment,StructuralAnalysisView]"
    );

    let mut mvd = file.mvd();
    assert_eq!(mvd.view_definitions().unwrap().len(), 3);
}

#[test]
fn test_collect_all_gathers_independent_errors() {
    // FILE_NAME is one parameter short and #1 is declared twice
    let content = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION((''),'2;1');
FILE_NAME('','',(''),(''),'','');
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCWALL();
#1=IFCDOOR();
ENDSEC;
END-ISO-10303-21;
";
    let err = SpfParser::new().parse_str(content).unwrap_err();

    match err {
        Error::Validation(collected) => {
            assert_eq!(collected.errors.len(), 2);
            assert!(matches!(collected.errors[0], Diagnostic::HeaderField(_)));
            assert!(matches!(collected.errors[1], Diagnostic::DuplicateName(_)));

            let json = collected.to_json(true);
            let array = json.as_array().unwrap();
            assert_eq!(array.len(), 2);
            assert_eq!(array[0]["type"], "invalid_header_field");
            assert_eq!(array[1]["type"], "duplicate_name");
            assert!(array.iter().all(|o| o.get("message").is_some()));

            let banner = collected.to_string();
            assert!(banner.starts_with("2 validation error(s) collected:"));
            assert!(banner.contains("Duplicate instance name #1"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_header_only_equals_full_header() {
    let full = SpfParser::new().parse_str(VALID).unwrap();
    let header_only = SpfParser {
        only_header: true,
        ..SpfParser::new()
    }
    .parse_str(VALID)
    .unwrap();

    assert_eq!(full.get_header(), header_only.get_header());
    assert!(header_only.get_entities().is_empty());
}

#[test]
fn test_syntax_error_banner_points_at_column() {
    let content = VALID.replace("#3=IFCLOCALPLACEMENT($,#4);", "#3=IFCLOCALPLACEMENT($,,#4);");
    let err = SpfParser::new().parse_str(&content).unwrap_err();

    match err {
        Error::Validation(collected) => {
            let banner = collected.errors[0].to_string();
            assert!(banner.starts_with("On line 11 column 24:"));
            assert!(banner.contains("Unexpected comma (',')"));
            assert!(banner.contains("00011 | #3=IFCLOCALPLACEMENT($,,#4);"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_skeleton_and_full_pass_agree_on_validity() {
    assert!(SpfParser::new().parse_str(VALID).is_ok());
    assert!(SpfParser {
        with_tree: false,
        ..SpfParser::new()
    }
    .parse_str(VALID)
    .is_ok());
}
