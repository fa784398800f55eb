mod common;

use std::time::Duration;

use dicom_ul::pdu::{
    AssociationRJResult, AssociationRJServiceProviderPresentationReason, AssociationRJSource, Pdu,
};

use common::{associate, loopback_config, release, start_scp};

async fn wait_for_active(limiter: &dimse::AssociationLimiter, expected: usize) {
    for _ in 0..100 {
        if limiter.active() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} active associations, found {}", expected, limiter.active());
}

#[tokio::test]
async fn associations_beyond_the_limit_are_refused() {
    let scp = start_scp(loopback_config(2)).await;

    let (first, reply) = associate(scp.addr, "SCU_ONE").await;
    assert!(matches!(reply, Pdu::AssociationAC(_)));
    let (second, reply) = associate(scp.addr, "SCU_TWO").await;
    assert!(matches!(reply, Pdu::AssociationAC(_)));
    assert_eq!(scp.limiter.active(), 2);

    let (_third, reply) = associate(scp.addr, "SCU_THREE").await;
    match reply {
        Pdu::AssociationRJ(rj) => {
            assert_eq!(rj.result, AssociationRJResult::Transient);
            assert_eq!(
                rj.source,
                AssociationRJSource::ServiceProviderPresentation(
                    AssociationRJServiceProviderPresentationReason::LocalLimitExceeded
                )
            );
        }
        other => panic!("expected A-ASSOCIATE-RJ, got {:?}", other),
    }

    // a released slot can be taken again
    assert!(matches!(release(first).await, Some(Pdu::ReleaseRP)));
    wait_for_active(&scp.limiter, 1).await;

    let (fourth, reply) = associate(scp.addr, "SCU_FOUR").await;
    assert!(matches!(reply, Pdu::AssociationAC(_)));

    assert!(matches!(release(second).await, Some(Pdu::ReleaseRP)));
    assert!(matches!(release(fourth).await, Some(Pdu::ReleaseRP)));
    wait_for_active(&scp.limiter, 0).await;

    scp.shutdown.cancel();
    scp.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn refused_requests_do_not_hold_a_slot() {
    let scp = start_scp(loopback_config(1)).await;

    // nothing acceptable is proposed
    let (_pdus, reply) = common::associate_with(scp.addr, "SCU", &["1.2.3.4.5"]).await;
    assert!(matches!(reply, Pdu::AssociationRJ(_)));
    wait_for_active(&scp.limiter, 0).await;

    let (pdus, reply) = associate(scp.addr, "SCU").await;
    assert!(matches!(reply, Pdu::AssociationAC(_)));
    assert!(matches!(release(pdus).await, Some(Pdu::ReleaseRP)));

    scp.shutdown.cancel();
    scp.handle.await.unwrap().unwrap();
}
