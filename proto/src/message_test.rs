use super::*;

#[test]
fn test_progress_wire_shape() {
    let line = Message::progress(42, "Transcribing... 42%").to_line().unwrap();
    assert_eq!(
        line,
        r#"{"type":"progress","percent":42,"status":"Transcribing... 42%"}"#
    );
}

#[test]
fn test_error_wire_shape() {
    let line = Message::error("File not found: ./nope.wav")
        .to_line()
        .unwrap();
    assert_eq!(
        line,
        r#"{"type":"error","message":"File not found: ./nope.wav"}"#
    );
}

#[test]
fn test_complete_wire_shape_rounds_duration() {
    let line = Message::complete("en", 12.345_678).to_line().unwrap();
    assert_eq!(line, r#"{"type":"complete","language":"en","duration":12.346}"#);
}

#[test]
fn test_segment_wire_shape() {
    let words = vec![Word::new(" Hello ", 0.0, 0.5), Word::new("world", 0.6, 1.23)];
    let segment = Segment::new(0, 0.0, 1.23, "  Hello world ", words);
    let line = Message::segment(segment).to_line().unwrap();
    assert_eq!(
        line,
        concat!(
            r#"{"type":"segment","data":{"id":"seg_0000","start":0.0,"end":1.23,"text":"Hello world","#,
            r#""words":[{"word":"Hello","start":0.0,"end":0.5},{"word":"world","start":0.6,"end":1.23}]}}"#
        )
    );
}

#[test]
fn test_serialization_rounds_fields_set_directly() {
    let segment = Segment {
        id: "seg_0001".to_string(),
        start: 1.000_49,
        end: 2.123_456,
        text: "x".to_string(),
        words: vec![],
    };
    let line = Message::segment(segment).to_line().unwrap();
    assert!(line.contains(r#""start":1.0,"end":2.123"#), "{line}");
}

#[test]
fn test_round_ms() {
    assert_eq!(round_ms(1.234_56), 1.235);
    assert_eq!(round_ms(0.000_4), 0.0);
    assert_eq!(round_ms(-0.000_4).to_string(), "0");
    assert_eq!(round_ms(f64::NAN), 0.0);
    assert_eq!(round_ms(f64::INFINITY), 0.0);
}

#[test]
fn test_clamp_percent() {
    assert_eq!(clamp_percent(-5.0), 0);
    assert_eq!(clamp_percent(42.9), 42);
    assert_eq!(clamp_percent(250.0), 100);
    assert_eq!(clamp_percent(f64::NAN), 0);
}

#[test]
fn test_progress_constructor_caps_at_100() {
    assert_eq!(
        Message::progress(140, "x"),
        Message::Progress {
            percent: 100,
            status: "x".to_string()
        }
    );
}

#[test]
fn test_segment_id_format() {
    assert_eq!(Segment::id_for(0), "seg_0000");
    assert_eq!(Segment::id_for(17), "seg_0017");
    assert_eq!(Segment::id_for(12345), "seg_12345");
}

#[test]
fn test_segment_span_is_normalized() {
    let segment = Segment::new(3, -0.5, -1.0, "text", vec![]);
    assert_eq!(segment.start, 0.0);
    assert_eq!(segment.end, 0.0);

    let segment = Segment::new(3, 2.0, 1.0, "text", vec![]);
    assert_eq!(segment.start, 2.0);
    assert_eq!(segment.end, 2.0);
}

#[test]
fn test_segment_orders_words_by_start() {
    let words = vec![
        Word::new("b", 1.0, 1.5),
        Word::new("a", 0.2, 0.8),
        Word::new("c", 1.0, 1.2),
    ];
    let segment = Segment::new(0, 0.0, 2.0, "a b c", words);
    let order: Vec<&str> = segment.words.iter().map(|w| w.word.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn test_word_end_not_before_start() {
    let word = Word::new("x", 1.5, 1.2);
    assert_eq!(word.start, 1.5);
    assert_eq!(word.end, 1.5);
}

#[test]
fn test_segment_round_trip() {
    let words = vec![Word::new("one", 0.111_1, 0.499_9), Word::new("two", 0.5, 0.987_65)];
    let segment = Segment::new(7, 0.111_1, 0.987_65, "one two", words);
    let line = Message::segment(segment.clone()).to_line().unwrap();

    match parse_line(&line).unwrap() {
        Some(Message::Segment { data }) => {
            assert_eq!(data.id, segment.id);
            assert_eq!(data.text, segment.text);
            assert!((data.start - segment.start).abs() < 1e-9);
            assert!((data.end - segment.end).abs() < 1e-9);
            assert_eq!(data.words.len(), 2);
            for (parsed, original) in data.words.iter().zip(&segment.words) {
                assert_eq!(parsed.word, original.word);
                assert!((parsed.start - original.start).abs() < 1e-9);
                assert!((parsed.end - original.end).abs() < 1e-9);
            }
        }
        other => panic!("Expected segment, got {:?}", other),
    }
}

#[test]
fn test_parse_defaults_missing_fields() {
    let message = parse_line(r#"{"type":"segment","data":{"id":"seg_0002"}}"#)
        .unwrap()
        .unwrap();
    assert_eq!(
        message,
        Message::Segment {
            data: Segment {
                id: "seg_0002".to_string(),
                start: 0.0,
                end: 0.0,
                text: String::new(),
                words: vec![],
            }
        }
    );

    let message = parse_line(r#"{"type":"complete"}"#).unwrap().unwrap();
    assert_eq!(message, Message::complete("", 0.0));

    let message = parse_line(r#"{"type":"error"}"#).unwrap().unwrap();
    assert_eq!(message, Message::error(""));
}

#[test]
fn test_parse_clamps_percent() {
    let message = parse_line(r#"{"type":"progress","percent":180,"status":"s"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(message, Message::progress(100, "s"));

    let message = parse_line(r#"{"type":"progress","percent":-3}"#)
        .unwrap()
        .unwrap();
    assert_eq!(message, Message::progress(0, ""));

    let message = parse_line(r#"{"type":"progress","percent":12.7,"status":"s"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(message, Message::progress(12, "s"));
}

#[test]
fn test_parse_blank_line() {
    assert!(parse_line("").unwrap().is_none());
    assert!(parse_line("   \r").unwrap().is_none());
}

#[test]
fn test_parse_rejects_noise() {
    assert!(matches!(
        parse_line("Downloading model: 45%"),
        Err(ProtocolError::Malformed(_))
    ));
    assert!(matches!(
        parse_line(r#"{"type":"banner","text":"hi"}"#),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_terminal_kinds() {
    assert!(!Message::progress(1, "").is_terminal());
    assert!(!Message::segment(Segment::default()).is_terminal());
    assert!(Message::complete("en", 1.0).is_terminal());
    assert!(Message::error("boom").is_terminal());
    assert_eq!(Message::complete("en", 1.0).kind(), "complete");
}

#[test]
fn test_multiline_text_stays_on_one_line() {
    let line = Message::error("first\nsecond").to_line().unwrap();
    assert!(!line.contains('\n'));
    assert_eq!(
        parse_line(&line).unwrap().unwrap(),
        Message::error("first\nsecond")
    );
}
