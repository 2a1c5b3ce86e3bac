mod common;

use dkim_parse::*;

#[cfg(feature = "pre-rfc8301")]
#[tokio::test]
async fn sha1_basic() {
    use dkim_parse::verifier::PolicyError;

    let _ = tracing_subscriber::fmt::try_init();

    let resolver = common::fixture_lookup();
    let message = common::read_message("rsa_sha1.eml").await;

    let results = Verifier::new(Config::default())
        .verify_message(&resolver, &message)
        .await
        .unwrap();

    assert_eq!(
        results[0].error,
        Some(VerifierError::Policy(PolicyError::DisallowedSha1Hash))
    );

    let config = Config {
        allow_sha1: true,
        ..Default::default()
    };

    let results = Verifier::new(config)
        .verify_message(&resolver, &message)
        .await
        .unwrap();

    assert_eq!(results[0].status, DkimStatus::Ok);
}

#[cfg(not(feature = "pre-rfc8301"))]
#[tokio::test]
async fn sha1_basic() {
    use dkim_parse::signature::DkimSignatureErrorKind;

    let _ = tracing_subscriber::fmt::try_init();

    let resolver = common::fixture_lookup();
    let message = common::read_message("rsa_sha1.eml").await;

    let config = Config {
        allow_sha1: true,
        ..Default::default()
    };

    let results = Verifier::new(config)
        .verify_message(&resolver, &message)
        .await
        .unwrap();

    assert_eq!(results[0].status, DkimStatus::PermFail);

    match &results[0].error {
        Some(VerifierError::SignatureFormat(e)) => {
            assert_eq!(e.kind, DkimSignatureErrorKind::HistoricAlgorithm);
            assert_eq!(e.domain, Some(DomainName::new("example.org").unwrap()));
        }
        e => panic!("unexpected error {e:?}"),
    }
}
