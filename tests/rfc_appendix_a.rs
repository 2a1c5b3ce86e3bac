mod common;

use common::MockLookup;
use dkim_parse::*;

// RFC 6376, appendix C
const BRISBANE_SPKI: &str = "MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQDwIRP/UC3SBsEmGqZ9ZJW3/DkMoGeLnQg1fWn7/zYtIxN2SnFCjxOCKG9v3b4jYfcTNh5ijSsq631uBItLa7od+v/RtdC2UzJ1lWT947qR+Rcac2gbto/NMqJ0fzfVjH4OuKhitdY9tf6mcwGjaNBcWToIMmPSPDdQPNUYckcQ2QIDAQAB";
const BRISBANE_RSA: &str = "MIGJAoGBAPAhE/9QLdIGwSYapn1klbf8OQygZ4udCDV9afv/Ni0jE3ZKcUKPE4Iob2/dviNh9xM2HmKNKyrrfW4Ei0truh36/9G10LZTMnWVZP3jupH5FxpzaBu2j80yonR/N9WMfg64qGK11j21/qZzAaNo0FxZOggyY9I8N1A81RhyRxDZAgMBAAE=";

/// Example from RFC 6376, appendix A.2, with public key in SPKI format.
#[tokio::test]
async fn rfc_appendix_a_spki() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = MockLookup::with_record(format!("v=DKIM1; k=rsa; p={BRISBANE_SPKI}"));

    let results = Verifier::new(Config::default())
        .verify_message(&resolver, &make_message())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, DkimStatus::Ok);
    assert_eq!(results[0].key_size, Some(1024));
}

/// Example from RFC 6376, appendix A.2, with public key in RSAPublicKey format.
#[tokio::test]
async fn rfc_appendix_a_rsa() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = MockLookup::with_record(format!("v=DKIM1; k=rsa; p={BRISBANE_RSA}"));

    let results = Verifier::new(Config::default())
        .verify_message(&resolver, &make_message())
        .await
        .unwrap();

    assert_eq!(results[0].status, DkimStatus::Ok);
}

#[tokio::test]
async fn rfc_appendix_a_processed_header() {
    let _ = tracing_subscriber::fmt::try_init();

    let results = Verifier::new(Config::default())
        .parse_message(&make_message())
        .unwrap();

    let processed = results[0].processed_header.as_deref().unwrap();

    assert!(processed.starts_with(
        b"Received: from client1.football.example.com  [192.0.2.1]\r\n      by submitserver"
    ));
    assert!(processed.ends_with(b"bh=2jUSOH9NhtVGCQWNr9BrIAPreKQjO6Sn7XIkfJVOzv8=;\r\n      b=;"));
}

#[tokio::test]
async fn rfc_appendix_a_modified_body() {
    let _ = tracing_subscriber::fmt::try_init();

    let resolver = MockLookup::with_record(format!("v=DKIM1; k=rsa; p={BRISBANE_SPKI}"));

    let message = common::tamper(&make_message(), "Joe.", "Jane.");

    let results = Verifier::new(Config::default())
        .verify_message(&resolver, &message)
        .await
        .unwrap();

    assert_eq!(results[0].status, DkimStatus::PermFail);
    assert_eq!(results[0].error, Some(VerifierError::BodyHashMismatch));
}

// Note RFC 6376, errata 4926 and 3192!
fn make_message() -> Vec<u8> {
    "\
DKIM-Signature: v=1; a=rsa-sha256; s=brisbane; d=example.com;
      c=simple/simple; q=dns/txt; i=joe@football.example.com;
      h=Received : From : To : Subject : Date : Message-ID;
      bh=2jUSOH9NhtVGCQWNr9BrIAPreKQjO6Sn7XIkfJVOzv8=;
      b=AuUoFEfDxTDkHlLXSZEpZj79LICEps6eda7W3deTVFOk4yAUoqOB
        4nujc7YopdG5dWLSdNg6xNAZpOPr+kHxt1IrE+NahM6L/LbvaHut
        KVdkLLkpVaVVQPzeRDI009SO2Il5Lu7rDNH6mZckBdrIx0orEtZV
        4bmp/YzhwvcubU4=;
Received: from client1.football.example.com  [192.0.2.1]
      by submitserver.example.com with SUBMISSION;
      Fri, 11 Jul 2003 21:01:54 -0700 (PDT)
From: Joe SixPack <joe@football.example.com>
To: Suzie Q <suzie@shopping.example.net>
Subject: Is dinner ready?
Date: Fri, 11 Jul 2003 21:00:37 -0700 (PDT)
Message-ID: <20030712040037.46341.5F8J@football.example.com>

Hi.

We lost the game. Are you hungry yet?

Joe.
"
    .replace('\n', "\r\n")
    .into_bytes()
}
