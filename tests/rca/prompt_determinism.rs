use debug_genie::{
    case_data::{CaseComment, CaseRecord},
    prompt::PromptBuilder,
};
use time::macros::datetime;

use crate::support::sample_case;

fn cases() -> Vec<(CaseRecord, Vec<CaseComment>)> {
    let mut braces = sample_case();
    braces.description = "payload was {\"rootCause\": null} and } stray {".to_string();

    let mut unicode = sample_case();
    unicode.subject = "Zahlung fehlgeschlagen: Überweisung ✗".to_string();

    let tied = vec![
        CaseComment {
            author: "agent-a".to_string(),
            body: "first at ten".to_string(),
            created_at: datetime!(2026-03-01 10:00 UTC),
        },
        CaseComment {
            author: "agent-b".to_string(),
            body: "second at ten <b>bold</b>".to_string(),
            created_at: datetime!(2026-03-01 10:00 UTC),
        },
    ];

    vec![
        (sample_case(), Vec::new()),
        (braces, tied.clone()),
        (unicode, tied),
    ]
}

#[test]
fn given_same_input_when_built_twice_then_prompts_are_byte_identical() {
    let builder = PromptBuilder;
    for (case, comments) in cases() {
        let first = builder.build(&case, &comments);
        let second = builder.build(&case.clone(), &comments.clone());
        assert_eq!(first, second);
        assert_eq!(first.context.as_bytes(), second.context.as_bytes());
        assert_eq!(first.fingerprint(), second.fingerprint());
    }
}

#[test]
fn given_any_input_then_section_delimiters_stay_balanced() {
    let builder = PromptBuilder;
    for (case, comments) in cases() {
        let prompt = builder.build(&case, &comments);
        for tag in ["case", "subject", "description", "comments", "output-contract"] {
            let open = format!("<{tag}");
            let close = format!("</{tag}>");
            assert_eq!(prompt.context.matches(&close).count(), 1, "{tag}");
            assert!(prompt.context.matches(&open).count() >= 1, "{tag}");
        }
        assert_eq!(
            prompt.context.matches("<comment ").count(),
            comments.len(),
            "one comment element per comment"
        );
        assert!(!prompt.context.contains("<b>"));
    }
}
