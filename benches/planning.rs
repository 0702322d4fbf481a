use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mailpull::export::naming::{plan, DEFAULT_PREFIX_BUDGET};
use mailpull::model::part::{MessagePart, PartBody, PartHeader};
use mailpull::parser::attachment::{collect_candidates, AttachmentPolicy};
use mailpull::parser::body::extract_body;
use mailpull::parser::encode_transport;

fn bench_plan(c: &mut Criterion) {
    let long_subject = "Re: Fwd: quarterly numbers (final, really final) ".repeat(10);

    c.bench_function("plan_short_subject", |b| {
        b.iter(|| {
            plan(
                black_box("Mon, 2 Jan 2006 15:04:05 -0700 (UTC)"),
                black_box("Receipt/For:You!"),
                DEFAULT_PREFIX_BUDGET,
            )
        })
    });

    c.bench_function("plan_long_subject", |b| {
        b.iter(|| {
            plan(
                black_box("Tue, 9 Jan 2024 08:00:00 +0100"),
                black_box(&long_subject),
                DEFAULT_PREFIX_BUDGET,
            )
        })
    });
}

/// A nested multipart tree with `n` attachments and an alternative body.
fn sample_tree(n: usize) -> MessagePart {
    let text = |mime: &str, data: &str| MessagePart {
        mime_type: mime.to_string(),
        body: Some(PartBody {
            data: encode_transport(data.as_bytes()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let alternative = MessagePart {
        mime_type: "multipart/alternative".into(),
        parts: vec![
            text("text/plain", "Hello there"),
            text("text/html", "<p>Hello there</p>"),
        ],
        ..Default::default()
    };
    let attachments = (0..n).map(|i| MessagePart {
        mime_type: "application/pdf".into(),
        headers: vec![PartHeader {
            name: "Content-Disposition".into(),
            value: format!("attachment; filename=\"doc{i}.pdf\""),
        }],
        body: Some(PartBody {
            attachment_id: format!("ANGjdJ-{i:04}"),
            size: 4096,
            data: String::new(),
        }),
        ..Default::default()
    });
    MessagePart {
        mime_type: "multipart/mixed".into(),
        parts: std::iter::once(alternative).chain(attachments).collect(),
        ..Default::default()
    }
}

fn bench_walk(c: &mut Criterion) {
    let tree = sample_tree(50);
    let policy = AttachmentPolicy::default();

    c.bench_function("extract_body_50_parts", |b| {
        b.iter(|| extract_body(black_box(&tree)))
    });

    c.bench_function("collect_candidates_50_parts", |b| {
        b.iter(|| collect_candidates(black_box("m1"), black_box(&tree), &policy))
    });
}

criterion_group!(benches, bench_plan, bench_walk);
criterion_main!(benches);
