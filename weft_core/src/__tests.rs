use std::borrow::Cow;
use std::io::Read;
use std::sync::Arc;

use rstest::rstest;
use serde_json::json;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;

#[rstest]
#[case::markup("<p class=\"a\">plain</p>")]
#[case::slashes_and_stars("1/2/*3 * 4 */ 5")]
#[case::regular_comment("<!-- regular --><!---->")]
#[case::unicode("héllo <b>wörld</b> ✓")]
#[case::partial_opener_at_end("a<!--/")]
#[case::empty("")]
#[case::unpaired_prototype_closer("a /*/--> b")]
#[case::closer_in_script("<script>var re = /*/-->*/ 1;</script>")]
fn reader_leaves_unmarked_input_alone(
	#[case] input: &str,
	#[values(1, 2, 3, 5, 7, 64)] chunk: usize,
) -> AnyEmptyResult {
	assert_eq!(strip(input, chunk)?, input);

	Ok(())
}

#[rstest]
#[case::prototype_only("<p>a<!--/*/x/*/-->b</p>", "<p>axb</p>")]
#[case::parser_level("<p>a<!--/*c*/-->b</p>", "<p>ab</p>")]
#[case::empty_parser_level("x<!--/**/-->y", "xy")]
#[case::multiline_parser_level("1<!--/*\n2\n*/-->3", "13")]
#[case::prototype_closer_inside_parser_level("<!--/* a /*/--> b */-->c", "c")]
#[case::unterminated_parser_level("a<!--/* b", "a")]
#[case::both("<!--/*/<b>/*/--><!--/*<i>*/--></b>", "<b></b>")]
#[case::second_prototype_closer_kept("<!--/*/a/*/-->/*/-->b", "a/*/-->b")]
#[case::parser_level_inside_prototype("<!--/*/a<!--/*x*/-->b/*/-->c", "abc")]
fn reader_strips_special_comments(
	#[case] input: &str,
	#[case] expected: &str,
	#[values(1, 2, 3, 5, 7, 64)] chunk: usize,
) -> AnyEmptyResult {
	assert_eq!(strip(input, chunk)?, expected);

	Ok(())
}

#[test]
fn reader_propagates_io_errors() {
	let mut output = String::new();
	let error = CommentStrippingReader::new(FailingReader { data: b"<p>a" })
		.read_to_string(&mut output)
		.unwrap_err();

	assert_eq!(error.kind(), std::io::ErrorKind::ConnectionReset);
}

#[test]
fn reader_reports_comment_state() -> AnyEmptyResult {
	let mut reader = CommentStrippingReader::with_capacity(16, "ab<!--/* c".as_bytes());
	let mut buffer = [0; 2];
	let read = reader.read(&mut buffer)?;

	assert_eq!(&buffer[..read], b"ab");
	assert!(reader.inside_comment());

	Ok(())
}

#[test]
fn pipeline_propagates_io_errors_unchanged() {
	let mut recorder = EventRecorder::new();
	let error = TemplateParser::default()
		.with_comment_strategy(CommentStrategy::Reader)
		.parse_reader("stream.html", FailingReader { data: b"<p>" }, &mut recorder)
		.unwrap_err();

	let WeftError::Io(error) = error else {
		panic!("expected an io error, got {error:?}");
	};
	assert_eq!(error.kind(), std::io::ErrorKind::ConnectionReset);
}

#[test]
fn tokenizer_reports_positions() -> AnyEmptyResult {
	let trace = html_trace("<p id=\"a\">x\n  <b>y</b></p>")?;

	insta::assert_snapshot!(trace, @r#"
	1:1 document-start
	1:1 open-start p
	1:3 whitespace " "
	1:4 attribute "id" = "a"
	1:10 open-end p
	1:11 text "x\n  "
	2:3 open-start b
	2:5 open-end b
	2:6 text "y"
	2:7 close-start b
	2:10 close-end b
	2:11 close-start p
	2:14 close-end p
	2:15 document-end
	"#);

	Ok(())
}

#[test]
fn attribute_value_positions_skip_the_quote() -> AnyEmptyResult {
	let recorder = record(&ParseConfiguration::html(), "<a href='x' b=y c>")?;
	let attributes: Vec<_> = recorder
		.iter()
		.filter_map(|event| {
			match event {
				MarkupEvent::Attribute(attribute) => {
					Some((
						attribute.name.to_string(),
						attribute.value.to_string(),
						attribute.value_position,
					))
				}
				_ => None,
			}
		})
		.collect();

	assert_eq!(attributes, vec![
		("href".to_string(), "x".to_string(), Position::new(1, 10)),
		("b".to_string(), "y".to_string(), Position::new(1, 15)),
		("c".to_string(), String::new(), Position::new(1, 18)),
	]);

	Ok(())
}

#[test]
fn html_auto_closes_implied_and_unbalanced_elements() -> AnyEmptyResult {
	let trace = html_trace("<ul><li>a<li>b</ul>")?;

	insta::assert_snapshot!(trace, @r#"
	1:1 document-start
	1:1 open-start ul
	1:4 open-end ul
	1:5 open-start li
	1:8 open-end li
	1:9 text "a"
	1:10 auto-close-start li
	1:10 auto-close-end li
	1:10 open-start li
	1:13 open-end li
	1:14 text "b"
	1:15 auto-close-start li
	1:15 auto-close-end li
	1:15 close-start ul
	1:19 close-end ul
	1:20 document-end
	"#);

	Ok(())
}

#[rstest]
#[case::unbalanced("<a><b></a>", "<a><b></a>")]
#[case::stray_close("</x><p>", "</x><p>")]
#[case::unquoted("<a href=x>", "<a href=x>")]
#[case::unterminated_tag("<a href", "<a href")]
#[case::lone_angle("1 < 2", "1 < 2")]
#[case::malformed_doctype("x!<!DOCTYPE*/-->", "x!<!DOCTYPE*/-->")]
#[case::malformed_declaration("<?xml encoding=\"UTF-8\"?>x", "<?xml encoding=\"UTF-8\"?>x")]
fn html_never_fails_on_structure(#[case] input: &str, #[case] reconstructed: &str) -> AnyEmptyResult {
	let recorder = record(&ParseConfiguration::html(), input)?;
	let mut writer = MarkupWriter::new();
	recorder.replay(&mut writer)?;

	assert_eq!(writer.as_str(), reconstructed);

	Ok(())
}

#[test]
fn html_reads_malformed_prologs_as_text() -> AnyEmptyResult {
	let trace = html_trace("x!<!DOCTYPE*/-->")?;

	insta::assert_snapshot!(trace, @r#"
	1:1 document-start
	1:1 text "x!<!DOCTYPE*/-->"
	1:17 document-end
	"#);

	Ok(())
}

#[test]
fn html_reports_stray_close_tags_as_unmatched() -> AnyEmptyResult {
	let trace = html_trace("</x>")?;

	assert!(trace.contains("1:1 unmatched-close-start x"));
	assert!(trace.contains("1:4 unmatched-close-end x"));

	Ok(())
}

#[rstest]
#[case::unbalanced("<a><b></a>", "weft::unbalanced_element", 1, 7)]
#[case::unmatched("</a>", "weft::unmatched_close_element", 1, 1)]
#[case::unclosed("<a>", "weft::unclosed_element", 1, 1)]
#[case::duplicate_attribute("<a x=\"1\" x=\"2\"/>", "weft::duplicate_attribute", 1, 10)]
#[case::unquoted_value("<a x=1/>", "weft::unquoted_attribute_value", 1, 4)]
#[case::valueless_attribute("<a x/>", "weft::malformed_attribute", 1, 4)]
#[case::unterminated_value("<a x=\"1/>", "weft::malformed_attribute", 1, 4)]
#[case::unterminated_comment("<a><!-- x", "weft::unterminated_structure", 1, 4)]
#[case::unterminated_parser_level_comment("<a><!--/* x", "weft::unterminated_structure", 1, 4)]
#[case::misplaced_declaration("<a/><?xml version=\"1.0\"?>", "weft::misplaced_prolog", 1, 5)]
#[case::declaration_without_version(
	"<?xml encoding=\"UTF-8\"?><a/>",
	"weft::malformed_prolog",
	1,
	1
)]
fn xml_grammar_violations(
	#[case] input: &str,
	#[case] code: &str,
	#[case] line: usize,
	#[case] column: usize,
) {
	let error = record(&ParseConfiguration::xml(), input).unwrap_err();

	assert_eq!(
		miette::Diagnostic::code(&error).map(|code| code.to_string()),
		Some(code.to_string())
	);
	assert_eq!(error.position(), Some(Position::new(line, column)));
}

#[rstest]
#[case::forbidden_doctype(
	ParseConfiguration { doctype: PrologPresence::Forbidden, ..ParseConfiguration::xml() },
	"<!DOCTYPE a><a/>",
	"weft::prolog_forbidden",
	1,
	1
)]
#[case::required_doctype(
	ParseConfiguration { doctype: PrologPresence::Required, ..ParseConfiguration::xml() },
	"\n<a/>",
	"weft::prolog_required",
	2,
	1
)]
#[case::required_declaration(
	ParseConfiguration { xml_declaration: PrologPresence::Required, ..ParseConfiguration::xml() },
	"",
	"weft::prolog_required",
	1,
	1
)]
#[case::unique_attributes_in_html(
	ParseConfiguration { unique_attributes: true, ..ParseConfiguration::html() },
	"<p A=1 a=2>",
	"weft::duplicate_attribute",
	1,
	8
)]
#[case::embedding_depth(
	ParseConfiguration { max_embedding_depth: 0, ..ParseConfiguration::html() },
	"ab<!--/*/<b></b>/*/-->",
	"weft::embedding_too_deep",
	1,
	10
)]
fn configured_parse_failures(
	#[case] config: ParseConfiguration,
	#[case] input: &str,
	#[case] code: &str,
	#[case] line: usize,
	#[case] column: usize,
) {
	let error = record(&config, input).unwrap_err();

	assert_eq!(
		miette::Diagnostic::code(&error).map(|code| code.to_string()),
		Some(code.to_string())
	);
	assert_eq!(error.position(), Some(Position::new(line, column)));
}

#[test]
fn parse_failures_name_the_document() {
	let mut recorder = EventRecorder::new();
	let error = TemplateParser::new(ParseConfiguration::xml())
		.parse_str("broken.xml", "<a>\n<b></a>", &mut recorder)
		.unwrap_err();

	let WeftError::Template {
		document,
		line,
		column,
		source,
	} = error
	else {
		panic!("expected a template error, got {error:?}");
	};
	assert_eq!(document, "broken.xml");
	assert_eq!((line, column), (2, 4));
	assert!(matches!(*source, WeftError::UnbalancedElement { .. }));
}

#[test]
fn xml_prolog_is_parsed() -> AnyEmptyResult {
	let recorder = record(
		&ParseConfiguration::xml(),
		"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE note SYSTEM \"note.dtd\">\n<note/>",
	)?;

	let MarkupEvent::XmlDeclaration(declaration) = &recorder[1] else {
		panic!("expected an xml declaration, got {:?}", recorder[1]);
	};
	assert_eq!(declaration.version.as_deref(), Some("1.0"));
	assert_eq!(declaration.encoding.as_deref(), Some("UTF-8"));
	assert_eq!(declaration.standalone, None);

	let MarkupEvent::DocType(doctype) = &recorder[3] else {
		panic!("expected a doctype, got {:?}", recorder[3]);
	};
	assert_eq!(doctype.element_name, "note");
	assert_eq!(doctype.system_id.as_deref(), Some("note.dtd"));
	assert_eq!(doctype.position, Position::new(2, 1));

	Ok(())
}

#[test]
fn doctype_with_public_id_and_internal_subset() -> AnyEmptyResult {
	let recorder = record(
		&ParseConfiguration::html(),
		"<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0//EN\" \"x.dtd\" [<!ENTITY a \"b\">]>",
	)?;

	let MarkupEvent::DocType(doctype) = &recorder[1] else {
		panic!("expected a doctype, got {:?}", recorder[1]);
	};
	assert_eq!(doctype.kind.as_deref(), Some("PUBLIC"));
	assert_eq!(doctype.public_id.as_deref(), Some("-//W3C//DTD XHTML 1.0//EN"));
	assert_eq!(doctype.system_id.as_deref(), Some("x.dtd"));
	assert_eq!(doctype.internal_subset.as_deref(), Some("<!ENTITY a \"b\">"));

	Ok(())
}

#[test]
fn writer_reconstructs_the_source() -> AnyEmptyResult {
	let source = "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=utf-8><title>A &amp; \
	              B</title></head>\n<body class = 'x' hidden>\n<!-- note --><?php echo 1 \
	              ?><![CDATA[ raw ]]>\n<br/><img src=\"a.png\" >\n<script>if (a < b) \
	              {}</script>\n</body >\n</html>\n";
	let recorder = record(&ParseConfiguration::html(), source)?;
	let mut writer = MarkupWriter::new();
	recorder.replay(&mut writer)?;

	similar_asserts::assert_eq!(writer.as_str(), source);

	Ok(())
}

#[test]
fn raw_text_elements_hold_markup_as_text() -> AnyEmptyResult {
	let trace = html_trace("<script>if (a<b) { x = '</p>'; }</script>")?;

	assert!(trace.contains("1:9 text \"if (a<b) { x = '</p>'; }\""));
	assert!(!trace.contains("unmatched-close-start"));

	Ok(())
}

#[test]
fn prototype_comment_content_keeps_absolute_positions() -> AnyEmptyResult {
	let trace = html_trace("<div>\n  <!--/*/<span>x</span>/*/-->\n</div>")?;

	insta::assert_snapshot!(trace, @r#"
	1:1 document-start
	1:1 open-start div
	1:5 open-end div
	1:6 text "\n  "
	2:10 open-start span
	2:15 open-end span
	2:16 text "x"
	2:17 close-start span
	2:23 close-end span
	2:30 text "\n"
	3:1 close-start div
	3:6 close-end div
	3:7 document-end
	"#);

	Ok(())
}

#[test]
fn embedded_offset_only_shifts_the_first_line() -> AnyEmptyResult {
	let recorder = record(&ParseConfiguration::html(), "ab<!--/*/\n<i>x</i>/*/-->")?;
	let positions: Vec<_> = recorder
		.iter()
		.filter(|event| matches!(event, MarkupEvent::Text { .. } | MarkupEvent::OpenElementStart { .. }))
		.map(MarkupEvent::position)
		.collect();

	assert_eq!(positions, vec![
		Position::new(1, 1),
		Position::new(1, 10),
		Position::new(2, 1),
		Position::new(2, 4),
	]);

	Ok(())
}

#[test]
fn reader_strategy_reports_filtered_positions() -> AnyEmptyResult {
	let mut recorder = EventRecorder::new();
	TemplateParser::default()
		.with_comment_strategy(CommentStrategy::Reader)
		.parse_str("page.html", "<div>\n  <!--/*/<span>x</span>/*/-->\n</div>", &mut recorder)?;

	let span = recorder
		.iter()
		.find(|event| matches!(event, MarkupEvent::OpenElementStart { name, .. } if name == "span"))
		.map(MarkupEvent::position);
	assert_eq!(span, Some(Position::new(2, 3)));

	Ok(())
}

#[rstest]
#[case::text("<p>a /*/--> b</p>")]
#[case::script("<script>var re = /*/-->*/ 1;</script>")]
fn comment_strategies_agree_on_unpaired_closers(#[case] source: &str) -> AnyEmptyResult {
	let trace = |strategy| -> WeftResult<String> {
		let mut recorder = EventRecorder::new();
		TemplateParser::default()
			.with_comment_strategy(strategy)
			.parse_str("page.html", source, &mut recorder)?;
		Ok(recorder.trace())
	};

	let tokenized = trace(CommentStrategy::Tokenizer)?;
	assert!(tokenized.contains("/*/-->"));
	assert_eq!(trace(CommentStrategy::Reader)?, tokenized);

	Ok(())
}

#[test]
fn parser_level_comments_emit_nothing() -> AnyEmptyResult {
	let trace = html_trace("<p>a<!--/*c*/-->b<!--/**/--></p>")?;

	insta::assert_snapshot!(trace, @r#"
	1:1 document-start
	1:1 open-start p
	1:3 open-end p
	1:4 text "a"
	1:17 text "b"
	1:29 close-start p
	1:32 close-end p
	1:33 document-end
	"#);

	Ok(())
}

#[test]
fn special_comments_are_plain_comments_when_disabled() -> AnyEmptyResult {
	let config = ParseConfiguration {
		special_comments: false,
		..ParseConfiguration::html()
	};
	let trace = record(&config, "<!--/*c*/-->")?.trace();

	assert!(trace.contains("1:1 comment \"/*c*/\""));

	Ok(())
}

#[test]
fn processing_instructions_keep_target_and_content() -> AnyEmptyResult {
	let recorder = record(&ParseConfiguration::xml(), "<?php echo 1; ?><a/>")?;

	let MarkupEvent::ProcessingInstruction {
		target, content, ..
	} = &recorder[1]
	else {
		panic!("expected a processing instruction, got {:?}", recorder[1]);
	};
	assert_eq!(target, "php");
	assert_eq!(content.as_deref(), Some("echo 1; "));

	Ok(())
}

#[test]
fn events_serialize_with_a_type_tag() -> AnyEmptyResult {
	let event = MarkupEvent::OpenElementStart {
		name: Cow::Borrowed("p"),
		position: Position::new(3, 7),
	};

	assert_eq!(
		serde_json::to_value(&event)?,
		json!({ "type": "open_element_start", "name": "p", "position": { "line": 3, "column": 7 } })
	);

	Ok(())
}

#[test]
fn inline_expressions_become_blocks() -> AnyEmptyResult {
	let trace = inline_trace("<p>Hi [[${name}]]!</p>")?;

	insta::assert_snapshot!(trace, @r#"
	1:1 document-start
	1:1 open-start p
	1:3 open-end p
	1:4 text "Hi "
	1:7 open-start th:block
	1:9 attribute "th:text" = "${name}"
	1:7 open-end th:block
	1:7 close-start th:block
	1:7 close-end th:block
	1:18 text "!"
	1:19 close-start p
	1:22 close-end p
	1:23 document-end
	"#);

	Ok(())
}

#[test]
fn unescaped_inline_expressions_use_utext() -> AnyEmptyResult {
	let trace = inline_trace("[(${html})]")?;

	assert!(trace.contains("1:3 attribute \"th:utext\" = \"${html}\""));
	assert_eq!(block_count(&trace), 1);
	assert!(!trace.contains(" text "));

	Ok(())
}

#[test]
fn inline_expressions_track_lines() -> AnyEmptyResult {
	let trace = inline_trace("a\n[[b]] c")?;

	assert!(trace.contains("1:1 text \"a\\n\""));
	assert!(trace.contains("2:1 open-start th:block"));
	assert!(trace.contains("2:3 attribute \"th:text\" = \"b\""));
	assert!(trace.contains("2:6 text \" c\""));

	Ok(())
}

#[rstest]
#[case::no_expression("plain [text] (here)", 0)]
#[case::unterminated("a [[b", 0)]
#[case::mismatched_closer("[[a)]", 0)]
#[case::two_expressions("[[a]] and [(b)]", 2)]
#[case::quoted_closer("[[${'a]]b'}]]", 1)]
#[case::suspended_subtree("<div th:inline=\"none\">[[a]]<span>[[b]]</span></div>[[c]]", 1)]
#[case::data_attribute("<div data-th-inline=\"none\">[[a]]</div>[[c]]", 1)]
#[case::other_mode("<div th:inline=\"text\">[[a]]</div>", 0)]
#[case::host_mode("<div th:inline=\"html\">[[a]]</div>", 1)]
#[case::character_reference_mode("<div th:inline=\"&#116;ext\">[[a]]</div>", 0)]
#[case::hex_reference_mode("<div th:inline=\"n&#x6F;ne\">[[a]]</div>[[b]]", 1)]
#[case::case_insensitive_attribute("<div TH:INLINE=\"none\">[[a]]</div>", 0)]
#[case::auto_closed_children("<ul th:inline=\"none\"><li>[[a]]<li>[[b]]</ul>[[c]]", 1)]
#[case::unmatched_close_ignored("<div th:inline=\"none\"></p>[[a]]</div>[[b]]", 1)]
#[case::void_child("<div th:inline=\"none\"><br>[[a]]</div>", 0)]
#[case::last_inline_attribute_wins("<div th:inline=\"none\" data-th-inline=\"html\">[[a]]</div>[[b]]", 2)]
#[case::comments_untouched("<!-- [[a]] --><![CDATA[[[b]]]]>", 0)]
fn inline_rewriting(#[case] input: &str, #[case] blocks: usize) -> AnyEmptyResult {
	assert_eq!(block_count(&inline_trace(input)?), blocks);

	Ok(())
}

#[test]
fn inline_text_outside_expressions_is_kept_verbatim() -> AnyEmptyResult {
	let recorder = {
		let mut recorder = EventRecorder::new();
		TemplateParser::default()
			.with_inlining("th")
			.parse_str("page.html", "[[a]][[b]]", &mut recorder)?;
		recorder
	};

	let texts = recorder
		.iter()
		.filter(|event| matches!(event, MarkupEvent::Text { .. }))
		.count();
	assert_eq!(texts, 0);

	Ok(())
}

#[test]
fn inline_rewriting_is_idempotent() -> AnyEmptyResult {
	let config = ParseConfiguration::html();
	let mut first = InlinePreprocessor::new(EventRecorder::new(), TemplateMode::Html, "th");
	MarkupTokenizer::new(&config).parse("<p>Hi [[${name}]] and [(${html})]!</p>", &mut first)?;
	let first = first.into_inner();

	let mut second = InlinePreprocessor::new(EventRecorder::new(), TemplateMode::Html, "th");
	first.replay(&mut second)?;

	similar_asserts::assert_eq!(second.into_inner().into_events(), first.into_events());

	Ok(())
}

#[test]
fn duplicate_inline_attributes_stack_and_unwind_together() -> AnyEmptyResult {
	let config = ParseConfiguration {
		element_balancing: ElementBalancing::NoBalancing,
		..ParseConfiguration::html()
	};
	let recorder = record(&config, "<div th:inline=\"none\" data-th-inline=\"text\">")?;
	let mut preprocessor = InlinePreprocessor::new(EventRecorder::new(), TemplateMode::Html, "th");
	recorder.replay(&mut preprocessor)?;

	assert_eq!(preprocessor.scopes().to_vec(), vec![
		InlineScope {
			mode: Some(TemplateMode::Html),
			exec_level: 0,
		},
		InlineScope {
			mode: None,
			exec_level: 1,
		},
		InlineScope {
			mode: Some(TemplateMode::Text),
			exec_level: 1,
		},
	]);
	assert_eq!(preprocessor.current_mode(), Some(TemplateMode::Text));

	preprocessor.handle(MarkupEvent::CloseElementEnd {
		name: Cow::Borrowed("div"),
		position: Position::START,
	})?;

	assert_eq!(preprocessor.scopes().len(), 1);
	assert_eq!(preprocessor.exec_level(), 0);
	assert_eq!(preprocessor.current_mode(), Some(TemplateMode::Html));

	Ok(())
}

#[test]
#[traced_test]
fn unknown_inline_modes_disable_inlining() -> AnyEmptyResult {
	let trace = inline_trace("<div th:inline=\"bogus\">[[a]]</div>")?;

	assert_eq!(block_count(&trace), 0);
	assert!(logs_contain("unrecognized inline mode"));

	Ok(())
}

#[rstest]
#[case("x", false)]
#[case("[x]", false)]
#[case("a[[b", true)]
#[case("[(", true)]
#[case("]][[", true)]
fn detects_inline_openers(#[case] text: &str, #[case] expected: bool) {
	assert_eq!(might_need_inlining(text), expected);
}

#[rstest]
#[case("none", Ok(None))]
#[case("NONE", Ok(None))]
#[case("text", Ok(Some(TemplateMode::Text)))]
#[case(" JavaScript ", Ok(Some(TemplateMode::JavaScript)))]
#[case("css", Ok(Some(TemplateMode::Css)))]
#[case("nope", Err(UnknownTemplateMode("nope".into())))]
fn parses_inline_modes(
	#[case] value: &str,
	#[case] expected: Result<Option<TemplateMode>, UnknownTemplateMode>,
) {
	assert_eq!(TemplateMode::parse_inline(value), expected);
}

#[test]
fn model_builder_materializes_nodes() -> AnyEmptyResult {
	let repository = TextRepository::default();
	let mut builder = ModelBuilder::new(&repository);
	MarkupTokenizer::new(&ParseConfiguration::html()).parse("<p class=\"a\" hidden>  <br/></p>", &mut builder)?;
	let nodes = builder.into_nodes();

	assert_eq!(nodes.len(), 6);
	assert_eq!(nodes[0].kind(), NodeKind::Document);

	let Node::Element(paragraph) = &nodes[1] else {
		panic!("expected an element, got {:?}", nodes[1]);
	};
	assert_eq!(&*paragraph.name, "p");
	assert_eq!(paragraph.kind, ElementKind::Open);
	assert_eq!(
		paragraph.attribute("CLASS", false).and_then(|attribute| attribute.value.as_deref()),
		Some("a")
	);
	assert_eq!(paragraph.attribute("hidden", true).map(|attribute| attribute.value.clone()), Some(None));

	assert!(matches!(&nodes[2], Node::Text { text, .. } if &**text == "  "));
	assert!(repository.contains("  "));
	assert!(matches!(&nodes[3], Node::Element(br) if br.kind == ElementKind::Standalone));

	let Node::CloseElement(close) = &nodes[4] else {
		panic!("expected a close tag, got {:?}", nodes[4]);
	};
	assert_eq!(close.kind, CloseKind::Explicit);
	assert!(Arc::ptr_eq(&close.name, &paragraph.name));
	assert_eq!(nodes[5].kind(), NodeKind::Document);

	Ok(())
}

#[test]
fn model_builder_does_not_intern_content_text() -> AnyEmptyResult {
	let repository = TextRepository::default();
	let mut builder = ModelBuilder::new(&repository);
	MarkupTokenizer::new(&ParseConfiguration::html()).parse("<p>hello</p>", &mut builder)?;

	assert!(!repository.contains("hello"));
	assert!(repository.contains("p"));

	Ok(())
}

#[test]
fn interner_shares_equal_text() {
	let repository = TextRepository::new(1024);
	let first = repository.intern("div");
	let second = repository.intern(&String::from("div"));

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(repository.len(), 1);
	assert_eq!(repository.size(), 3);
}

#[test]
#[traced_test]
fn interner_stops_caching_when_full() {
	let repository = TextRepository::new(4);
	repository.intern("ab");
	let overflow = repository.intern("cde");

	assert_eq!(&*overflow, "cde");
	assert!(repository.contains("ab"));
	assert!(!repository.contains("cde"));
	assert_eq!(repository.size(), 2);
	assert!(logs_contain("text repository is full"));
}

#[test]
fn interner_unremovable_text_ignores_the_cap() {
	let repository = TextRepository::with_unremovable(0, ["html", "body"]);

	assert!(repository.contains("html"));
	assert!(Arc::ptr_eq(&repository.intern("html"), &repository.intern("html")));
	assert!(!repository.contains("head"));
}

#[test]
fn interner_is_shared_across_threads() {
	let repository = TextRepository::with_stripes(1024, 4);
	let words = ["div", "span", "  ", "\n\t", "p"];

	std::thread::scope(|scope| {
		for _ in 0..8 {
			scope.spawn(|| {
				for word in words {
					assert_eq!(&*repository.intern(word), word);
				}
			});
		}
	});

	assert_eq!(repository.len(), words.len());
	assert_eq!(repository.size(), words.iter().map(|word| word.len()).sum::<usize>());
}

#[test]
fn matcher_checks_required_attribute_values() {
	let matcher = ProcessorMatcher::unprefixed_element("input").with_attribute_value("type", Some("checkbox"));
	let context = html_context();

	assert!(matcher.matches(&element("input", &[("type", Some("checkbox"))]), &context));
	assert!(!matcher.matches(&element("input", &[("type", Some("text"))]), &context));
	assert!(!matcher.matches(&element("select", &[("type", Some("checkbox"))]), &context));
	assert!(!matcher.matches(&element("input", &[]), &context));
}

#[test]
fn matcher_presence_filters_ignore_values() {
	let matcher = ProcessorMatcher::any_element().with_attribute_value("hidden", None);
	let context = html_context();

	assert!(matcher.matches(&element("p", &[("hidden", None)]), &context));
	assert!(matcher.matches(&element("p", &[("hidden", Some("hidden"))]), &context));
	assert!(!matcher.matches(&element("p", &[]), &context));
}

#[rstest]
#[case::colon("th:block", true)]
#[case::hyphen("th-block", true)]
#[case::upper_case("TH:BLOCK", true)]
#[case::bare("block", false)]
#[case::other_prefix("x:block", false)]
#[case::longer_name("th:blocks", false)]
fn html_prefixed_element_names(#[case] name: &str, #[case] expected: bool) {
	let matcher = ProcessorMatcher::element("block");

	assert_eq!(matcher.matches(&element(name, &[]), &html_context()), expected);
}

#[rstest]
#[case::colon("th:block", true)]
#[case::hyphen("th-block", false)]
#[case::upper_case("TH:block", false)]
fn xml_prefixed_element_names(#[case] name: &str, #[case] expected: bool) {
	let matcher = ProcessorMatcher::element("block");

	assert_eq!(matcher.matches(&element(name, &[]), &xml_context()), expected);
}

#[rstest]
#[case::colon("th:text", true, true)]
#[case::data("data-th-text", true, false)]
#[case::upper_data("DATA-TH-TEXT", true, false)]
#[case::bare("text", false, false)]
#[case::data_without_prefix("data-text", false, false)]
fn prefixed_attribute_names(#[case] name: &str, #[case] in_html: bool, #[case] in_xml: bool) {
	let matcher = ProcessorMatcher::attribute("text");
	let node = element("span", &[(name, Some("${x}"))]);

	assert_eq!(matcher.matches(&node, &html_context()), in_html);
	assert_eq!(matcher.matches(&node, &xml_context()), in_xml);
}

#[test]
fn unprefixed_contexts_compare_bare_names() {
	let context = MatchingContext::new("plain", None, TemplateMode::Html);

	assert!(ProcessorMatcher::element("block").matches(&element("block", &[]), &context));
	assert!(!ProcessorMatcher::element("block").matches(&element("th:block", &[]), &context));
	assert!(ProcessorMatcher::attribute("text").matches(&element("p", &[("text", None)]), &context));
}

#[test]
fn attribute_matchers_can_be_restricted_to_an_element() {
	let matcher = ProcessorMatcher::attribute("field").on_element("input");
	let context = html_context();

	assert!(matcher.matches(&element("input", &[("th:field", Some("*{name}"))]), &context));
	assert!(!matcher.matches(&element("select", &[("th:field", Some("*{name}"))]), &context));
}

#[test]
fn tag_matchers_include_close_tags() {
	let matcher = ProcessorMatcher::tag("form");
	let context = html_context();

	assert!(matcher.matches(&element("form", &[]), &context));
	assert!(matcher.matches(&close_element("FORM"), &context));
	assert!(!matcher.matches(&close_element("div"), &context));
	assert!(
		!matcher
			.clone()
			.with_attribute_value("method", None)
			.matches(&close_element("form"), &context)
	);
}

#[rstest]
#[case::html(html_context(), &["th:block", "TH:BLOCK", "th-block"], &["block", "data-th-block"])]
#[case::xml(xml_context(), &["th:block"], &["TH:BLOCK", "th-block", "block"])]
fn prefixed_tag_matchers_cover_both_tags(
	#[case] context: MatchingContext,
	#[case] accepted: &[&str],
	#[case] rejected: &[&str],
) {
	let matcher = ProcessorMatcher::prefixed_tag("block");

	for name in accepted {
		assert!(matcher.matches(&element(name, &[]), &context), "{name}");
		assert!(matcher.matches(&close_element(name), &context), "/{name}");
	}
	for name in rejected {
		assert!(!matcher.matches(&close_element(name), &context), "/{name}");
	}
}

#[test]
fn mismatched_node_kinds_never_match() {
	let context = html_context();
	let nodes = [
		element("p", &[("th:text", None)]),
		close_element("p"),
		text("[[a]]"),
		Node::Comment {
			content: "c".into(),
			position: Position::START,
		},
		Node::DocumentStart {
			position: Position::START,
		},
	];
	let matchers = [
		ProcessorMatcher::attribute("text"),
		ProcessorMatcher::any_element(),
		ProcessorMatcher::text(),
		ProcessorMatcher::comment(),
		ProcessorMatcher::document(),
	];

	// Element matchers reject close tags. Those belong to tag matchers.
	let matching = [(0, 0), (1, 0), (2, 2), (3, 3), (4, 4)];

	for (row, matcher) in matchers.iter().enumerate() {
		for (column, node) in nodes.iter().enumerate() {
			let expected = matching.contains(&(row, column));
			assert_eq!(
				matcher.matches(node, &context),
				expected,
				"matcher {row} against node {column}"
			);
			assert_eq!(
				matcher.matches(node, &context),
				matcher.matches_kind(node)
					&& matcher.matches_name(node, &context)
					&& matcher.matches_attribute_values(node, &context)
			);
		}
	}
}

#[test]
fn processing_instruction_matchers_check_the_target() {
	let node = Node::ProcessingInstruction {
		target: "php".into(),
		content: None,
		position: Position::START,
	};
	let context = html_context();

	assert!(ProcessorMatcher::processing_instruction(None).matches(&node, &context));
	assert!(ProcessorMatcher::processing_instruction(Some("php")).matches(&node, &context));
	assert!(!ProcessorMatcher::processing_instruction(Some("xml-stylesheet")).matches(&node, &context));
}

#[rstest]
#[case::empty_name(ProcessorMatcher::element(""))]
#[case::filtered_text(ProcessorMatcher::text().with_attribute_value("a", None))]
#[case::restricted_element(ProcessorMatcher::any_element().on_element("input"))]
#[case::empty_filter(ProcessorMatcher::any_element().with_attribute_value("", None))]
fn invalid_matchers_are_rejected(#[case] matcher: ProcessorMatcher) {
	assert!(matches!(matcher.validate(), Err(WeftError::InvalidMatcher(_))));
}

#[test]
fn ok_result_is_the_only_ok_result() {
	assert!(ProcessorResult::ok().is_ok());
	assert!(ProcessorResult::default().is_ok());
	assert!(ProcessorResult::ok().with_local_variables(Vec::<(String, i32)>::new()).is_ok());
	assert!(!ProcessorResult::ok().with_local_variable("a", 1).is_ok());
	assert!(!ProcessorResult::ok().with_selection_target(serde_json::Value::Null).is_ok());
	assert!(!ProcessorResult::ok().with_text_inliner(None).is_ok());
}

#[test]
fn merging_the_ok_result_borrows_the_arguments() {
	let arguments = ExecutionArguments::with_variables([("user", json!({ "name": "Ada" }))]);
	let merged = arguments.apply(&ProcessorResult::ok(), 3);

	assert!(matches!(merged, Cow::Borrowed(_)));
	assert_eq!(*merged, arguments);
}

#[test]
fn reasserting_values_is_not_ok() {
	let arguments = ExecutionArguments::new();
	let merged = arguments.apply(&ProcessorResult::ok().with_selection_target(serde_json::Value::Null), 1);

	assert!(matches!(merged, Cow::Owned(_)));
	assert_eq!(*merged, arguments);
}

#[test]
fn local_variables_are_scoped_by_level() {
	let root = ExecutionArguments::with_variables([("a", 1)]);

	let child = root.apply(&ProcessorResult::ok().with_local_variables([("a", 2), ("b", 3)]), 1);
	assert_eq!(child.variable("a"), Some(&json!(2)));
	assert_eq!(child.variable("b"), Some(&json!(3)));
	assert_eq!(root.variable("a"), Some(&json!(1)));
	assert_eq!(root.variable("b"), None);

	let sibling = child.apply(&ProcessorResult::ok().with_local_variable("c", 4), 1);
	assert_eq!(sibling.scope_level(), Some(1));
	assert_eq!(
		sibling.variables().into_keys().collect::<Vec<_>>(),
		vec!["a", "b", "c"]
	);

	let grandchild = sibling.apply(&ProcessorResult::ok().with_local_variable("a", 5), 2);
	assert_eq!(grandchild.variable("a"), Some(&json!(5)));
	assert_eq!(grandchild.scope_level(), Some(2));
	assert_eq!(sibling.variable("a"), Some(&json!(2)));
}

#[test]
fn selection_target_and_inliner_replace_the_ambient_values() {
	let inliner: Arc<dyn TextInliner> = Arc::new(StandardTextInliner::new(TemplateMode::JavaScript));
	let arguments = ExecutionArguments::new();

	let selected = arguments.apply(
		&ProcessorResult::ok()
			.with_selection_target(json!({ "id": 7 }))
			.with_text_inliner(Some(Arc::clone(&inliner))),
		1,
	);
	assert_eq!(selected.selection_target(), Some(&json!({ "id": 7 })));
	assert_eq!(selected.text_inliner().map(|inliner| inliner.name()), Some("standard-javascript"));

	let cleared = selected.apply(
		&ProcessorResult::ok()
			.with_selection_target(serde_json::Value::Null)
			.with_text_inliner(None),
		2,
	);
	assert!(!cleared.has_selection_target());
	assert!(cleared.text_inliner().is_none());
	assert!(selected.has_selection_target());
}

#[test]
fn id_sequences_count_per_id() {
	let mut ids = IdSequences::new();

	assert_eq!(ids.peek_next_id("field"), 1);
	assert!(matches!(ids.previous_id("field"), Err(WeftError::MissingIdSequence(id)) if id == "field"));
	assert_eq!(ids.next_id("field"), 1);
	assert_eq!(ids.next_id("field"), 2);
	assert_eq!(ids.peek_next_id("field"), 3);
	assert_eq!(ids.previous_id("field").ok(), Some(2));
	assert_eq!(ids.next_id("other"), 1);
}

#[test]
fn processors_run_in_precedence_order() -> AnyEmptyResult {
	let mut dialects = DialectSet::new(TemplateMode::Html);
	dialects.register(&TestDialect::new("standard", vec![
		ordered("late", 1200),
		ordered("early", 500),
		ordered("middle", 1000),
	]))?;

	let arguments = ExecutionArguments::new();
	let mut ids = IdSequences::new();
	let result = dialects.process_node("page.html", &element("p", &[]), &arguments, 1, &mut ids)?;

	assert_eq!(result.variable("order"), Some(&json!(["early", "middle", "late"])));
	assert_eq!(arguments.variable("order"), None);

	Ok(())
}

#[test]
fn equal_precedences_keep_registration_order() -> AnyEmptyResult {
	let mut dialects = DialectSet::new(TemplateMode::Html);
	dialects.register(&TestDialect::new("first", vec![ordered("a", 100), ordered("b", 100)]))?;
	dialects.register(&TestDialect::new("second", vec![ordered("c", 100), ordered("z", 50)]))?;

	let names: Vec<_> = dialects
		.processors()
		.iter()
		.map(|processor| processor.processor.name().to_string())
		.collect();
	assert_eq!(names, vec!["z", "a", "b", "c"]);

	Ok(())
}

#[test]
fn matching_respects_each_dialect_prefix() -> AnyEmptyResult {
	let mut dialects = DialectSet::new(TemplateMode::Html);
	dialects.register(&TestDialect::new("standard", vec![ProcessorRegistration::new(
		ProcessorMatcher::attribute("text"),
		100,
		CountingProcessor::default(),
	)]))?;
	dialects.register(&TestDialect {
		name: "extras",
		prefix: Some("x"),
		registrations: vec![ProcessorRegistration::new(
			ProcessorMatcher::attribute("text"),
			100,
			CountingProcessor::default(),
		)],
	})?;

	let node = element("span", &[("data-th-text", Some("${a}"))]);
	let dialect_names: Vec<_> = dialects
		.matching(&node)
		.map(|processor| processor.context.dialect().to_string())
		.collect();
	assert_eq!(dialect_names, vec!["standard"]);

	Ok(())
}

#[test]
fn processor_failures_stop_the_node_and_carry_its_position() -> AnyEmptyResult {
	let counter = CountingProcessor::default();
	let mut dialects = DialectSet::new(TemplateMode::Html);
	dialects.register(&TestDialect::new("standard", vec![
		ProcessorRegistration::new(ProcessorMatcher::any_element(), 200, counter.clone()),
		ProcessorRegistration::new(ProcessorMatcher::any_element(), 100, FailingProcessor),
	]))?;

	let node = Node::Element(ElementTag::new("p", ElementKind::Open, Position::new(4, 9)));
	let arguments = ExecutionArguments::new();
	let error = dialects
		.process_node("page.html", &node, &arguments, 1, &mut IdSequences::new())
		.unwrap_err();

	let WeftError::Processor {
		processor,
		document,
		line,
		column,
		source,
	} = error
	else {
		panic!("expected a processor error, got {error:?}");
	};
	assert_eq!(processor, "failing");
	assert_eq!(document, "page.html");
	assert_eq!((line, column), (4, 9));
	assert!(matches!(*source, WeftError::Processing(ref message) if message == "boom"));
	assert_eq!(counter.calls(), 0);

	Ok(())
}

#[test]
fn id_sequences_are_threaded_through_processors() -> AnyEmptyResult {
	let mut dialects = DialectSet::new(TemplateMode::Html);
	dialects.register(&TestDialect::new("standard", vec![ProcessorRegistration::new(
		ProcessorMatcher::unprefixed_element("input"),
		100,
		IdProcessor,
	)]))?;

	let arguments = ExecutionArguments::new();
	let mut ids = IdSequences::new();
	let node = element("input", &[]);
	let first = dialects.process_node("form.html", &node, &arguments, 1, &mut ids)?;
	let second = dialects.process_node("form.html", &node, &arguments, 1, &mut ids)?;

	assert_eq!(first.variable("id"), Some(&json!("field1")));
	assert_eq!(second.variable("id"), Some(&json!("field2")));
	assert_eq!(ids.previous_id("field")?, 2);

	Ok(())
}

#[rstest]
#[case::empty("")]
#[case::leading_digit("1th")]
#[case::colon("th:x")]
#[case::space("t h")]
fn invalid_dialect_prefixes_are_rejected(#[case] prefix: &str) {
	let mut dialects = DialectSet::new(TemplateMode::Html);
	let result = dialects.register_with_prefix(&TestDialect::new("standard", vec![]), Some(prefix));

	assert!(matches!(result, Err(WeftError::InvalidDialectPrefix(_))));
}

#[test]
#[traced_test]
fn dialects_register_once_per_prefix() -> AnyEmptyResult {
	let dialect = TestDialect::new("standard", vec![ordered("a", 1)]);
	let mut dialects = DialectSet::new(TemplateMode::Html);
	dialects.register(&dialect)?;
	dialects.register_with_prefix(&dialect, Some("data"))?;

	assert!(matches!(
		dialects.register(&dialect),
		Err(WeftError::DuplicateDialect { ref name, ref prefix }) if name == "standard" && prefix == "th"
	));
	assert_eq!(dialects.contexts().len(), 2);
	assert!(logs_contain("registered dialect"));

	Ok(())
}

#[test]
fn registering_invalid_matchers_fails_immediately() {
	let mut dialects = DialectSet::new(TemplateMode::Html);
	let result = dialects.register(&TestDialect::new("standard", vec![ProcessorRegistration::new(
		ProcessorMatcher::attribute(""),
		1,
		FailingProcessor,
	)]));

	assert!(matches!(result, Err(WeftError::InvalidMatcher(_))));
	assert!(dialects.processors().is_empty());
}

#[test]
fn config_reads_toml() -> AnyEmptyResult {
	let config = WeftConfig::from_toml_str(
		r#"
template_mode = "xml"

[parser]
element_balancing = "auto_close"
doctype = "forbidden"

[inline]
prefix = "data"

[interner]
max_size = 64

[comments]
strategy = "reader"
"#,
	)?;

	let parse = config.parse_configuration();
	assert_eq!(parse.grammar, MarkupGrammar::Xml);
	assert!(parse.case_sensitive);
	assert_eq!(parse.element_balancing, ElementBalancing::AutoClose);
	assert_eq!(parse.doctype, PrologPresence::Forbidden);
	assert!(!parse.special_comments);
	assert!(config.inline.enabled);
	assert_eq!(config.interner.max_size, 64);

	let parser = TemplateParser::from_config(&config);
	assert_eq!(parser.comment_strategy(), CommentStrategy::Reader);
	assert_eq!(parser.inline_prefix(), Some("data"));

	Ok(())
}

#[test]
fn config_defaults_to_html() -> AnyEmptyResult {
	let config = WeftConfig::from_toml_str("")?;

	assert_eq!(config.parse_configuration(), ParseConfiguration::html());
	assert_eq!(config.interner.max_size, DEFAULT_REPOSITORY_MAX_SIZE);
	assert_eq!(config.inline.prefix, DEFAULT_DIALECT_PREFIX);

	Ok(())
}

#[test]
fn config_rejects_unknown_values() {
	let result = WeftConfig::from_toml_str("template_mode = \"svg\"");

	assert!(matches!(result, Err(WeftError::ConfigParse(_))));
}

#[test]
fn config_is_discovered_from_candidates() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	assert_eq!(WeftConfig::load(tmp.path())?, None);

	std::fs::create_dir_all(tmp.path().join(".config"))?;
	std::fs::write(tmp.path().join(".config/weft.toml"), "[inline]\nenabled = false\n")?;
	let config = WeftConfig::load(tmp.path())?.unwrap_or_default();
	assert!(!config.inline.enabled);

	std::fs::write(tmp.path().join("weft.toml"), "template_mode = \"xml\"\n")?;
	assert_eq!(
		WeftConfig::resolve_path(tmp.path()),
		Some(tmp.path().join("weft.toml"))
	);
	let config = WeftConfig::load(tmp.path())?.unwrap_or_default();
	assert_eq!(config.template_mode, MarkupGrammar::Xml);
	assert!(config.inline.enabled);

	Ok(())
}

#[test]
fn scratch_buffers_are_cleared_and_reused() {
	let first_capacity = with_scratch_buffer(|buffer| {
		buffer.push_str("template source");
		buffer.capacity()
	});

	with_scratch_buffer(|buffer| {
		assert!(buffer.is_empty());
		assert!(buffer.capacity() >= first_capacity);

		with_scratch_buffer(|nested| {
			assert!(nested.is_empty());
			nested.push_str("nested");
		});
		assert!(buffer.is_empty());
	});

	assert!(pooled_buffers() >= 1);
	assert!(pooled_buffers() <= 4);
}

#[test]
fn pipeline_parses_from_readers() -> AnyEmptyResult {
	let source = "<p>a<!--/*/<b>x</b>/*/--><!--/*gone*/--></p>";
	let parser = TemplateParser::default();

	let mut direct = EventRecorder::new();
	parser.parse_str("page.html", source, &mut direct)?;
	let mut streamed = EventRecorder::new();
	parser.parse_reader("page.html", TrickleReader::new(source.as_bytes(), 3), &mut streamed)?;

	assert_eq!(direct.into_events(), streamed.into_events());

	let mut filtered = MarkupWriter::new();
	parser
		.clone()
		.with_comment_strategy(CommentStrategy::Reader)
		.parse_reader("page.html", TrickleReader::new(source.as_bytes(), 3), &mut filtered)?;
	assert_eq!(filtered.as_str(), "<p>a<b>x</b></p>");

	Ok(())
}
