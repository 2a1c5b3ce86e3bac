use dkim_parse::{
    signature::{DomainName, Selector},
    verifier::{key_record_name, LookupTxt},
    *,
};
use hickory_resolver::TokioAsyncResolver;

/// Look up a key record that is known to be published.
#[tokio::test]
#[ignore = "depends on live DNS records"]
async fn live_key_record() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = TokioAsyncResolver::tokio(Default::default(), Default::default());

    let name = key_record_name(
        &DomainName::new("gmail.com").unwrap(),
        &Selector::new("20230601").unwrap(),
    );

    let txts = resolver.lookup_txt(&name).await.unwrap();

    let records: Vec<DkimKeyRecord> = txts
        .into_iter()
        .map(|txt| String::from_utf8(txt.unwrap()).unwrap().parse().unwrap())
        .collect();

    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.allows_email()));
}

/// Run a forged signature through the whole pipeline with live key lookup.
#[tokio::test]
#[ignore = "depends on live DNS records"]
async fn live_verify_forged_signature() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = TokioAsyncResolver::tokio(Default::default(), Default::default());

    let message = b"DKIM-Signature: v=1; a=rsa-sha256; c=relaxed/relaxed; d=gmail.com;\r\n\
        \ts=20230601; h=From:Subject; bh=Ba3gj8+xBPQLJTahTfzW6RbWQ/XPgESxkCi2B66PSQg=;\r\n\
        \tb=Zm9yZ2VkIHNpZ25hdHVyZQ==\r\n\
        From: someone@gmail.com\r\n\
        Subject: not really from gmail\r\n\
        \r\n\
        Hello\r\n";

    let results = Verifier::new(Config::default())
        .verify_message(&resolver, message)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, DkimStatus::PermFail);
    assert!(results[0].key_record.is_some());
    assert!(matches!(
        results[0].error,
        Some(VerifierError::VerificationFailure(_))
    ));
}
