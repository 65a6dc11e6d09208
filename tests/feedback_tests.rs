mod common;

use common::*;
use labjack_u6::{
    Ain24, BitDirWrite, BitDirection, BitState, BitStateRead, BitStateWrite, DigitalIoBit, FeedbackCommand, GainIndex,
    PortDirWrite, U6Error,
};

#[tokio::test]
async fn test_feedback_batch() {
    let (mut u6, mock) = open_session(12).await;
    let mut commands = [
        FeedbackCommand::from(Ain24::new(0).with_resolution(8).with_gain(GainIndex::X1)),
        FeedbackCommand::from(PortDirWrite::default().set(DigitalIoBit::FIO0, BitDirection::Output)),
        FeedbackCommand::from(BitStateWrite::new(DigitalIoBit::FIO0, BitState::High)),
        FeedbackCommand::from(BitStateRead::new(DigitalIoBit::FIO1)),
    ];
    // AIN24 code 0x82F300 sits on the nominal center point
    mock.push_response(feedback_response(1, &[0x00, 0xF3, 0x82, 0x01]));

    u6.feedback(&mut commands).await.unwrap();

    let request = mock.written().pop().unwrap();
    assert_eq!(hex::encode(&request[6..]), "01020008001d0100000100000b800a01");
    assert_eq!(request[2] as usize, (request.len() - 6) / 2);

    let FeedbackCommand::Ain24(ain) = &commands[0] else {
        panic!("expected AIN24");
    };
    assert_eq!(ain.raw(), Some(0x82F300));
    assert!(ain.voltage().unwrap().abs() < 1e-6);

    let FeedbackCommand::BitStateRead(read) = &commands[3] else {
        panic!("expected BitStateRead");
    };
    assert!(read.state().unwrap());
}

#[tokio::test]
async fn test_echo_advances_per_request() {
    let (mut u6, mock) = open_session(4).await;

    for echo in 1..=3u8 {
        let mut commands = [FeedbackCommand::from(BitDirWrite::new(
            DigitalIoBit::EIO0,
            BitDirection::Input,
        ))];
        mock.push_response(feedback_response(echo, &[0]));
        u6.feedback(&mut commands).await.unwrap();
        assert_eq!(mock.written().last().unwrap()[6], echo);
    }
}

#[tokio::test]
async fn test_stale_echo_is_rejected() {
    let (mut u6, mock) = open_session(4).await;
    let mut commands = [FeedbackCommand::from(BitStateRead::new(DigitalIoBit::FIO0))];
    mock.push_response(feedback_response(7, &[1]));

    assert!(matches!(
        u6.feedback(&mut commands).await,
        Err(U6Error::InvalidResponseHeader { offset: 8, .. })
    ));
}

#[tokio::test]
async fn test_device_error_names_failing_command() {
    let (mut u6, mock) = open_session(4).await;
    let mut commands = [
        FeedbackCommand::from(BitStateRead::new(DigitalIoBit::FIO0)),
        FeedbackCommand::from(Ain24::new(99)),
    ];
    let mut response = feedback_response(1, &[0, 0, 0, 0]);
    response[6] = 34;
    response[7] = 1;
    extended_checksum(&mut response).unwrap();
    mock.push_response(response);

    let err = u6.feedback(&mut commands).await.unwrap_err();
    assert!(matches!(err, U6Error::DeviceErrorCode { code: 34, frame: Some(1) }));
    assert_eq!(err.to_string(), "U6 error code 34 on frame 1");
}

#[tokio::test]
async fn test_short_response_underruns() {
    let (mut u6, mock) = open_session(4).await;
    let mut commands = [
        FeedbackCommand::from(Ain24::new(0)),
        FeedbackCommand::from(Ain24::new(1)),
    ];
    // only one reading came back
    mock.push_response(feedback_response(1, &[1, 2, 3]));

    assert!(matches!(
        u6.feedback(&mut commands).await,
        Err(U6Error::ResponseUnderrun { .. })
    ));
}

#[tokio::test]
async fn test_ain24_uses_session_calibration() {
    let (mut u6, mock) = open_session(12).await;
    let mut commands = [FeedbackCommand::from(Ain24::new(2).with_resolution(1))];
    mock.push_response(feedback_response(1, &[0x00, 0x00, 0xC0]));
    u6.feedback(&mut commands).await.unwrap();

    let FeedbackCommand::Ain24(ain) = &commands[0] else {
        panic!("expected AIN24");
    };
    let expected = u6.calibration().calibrated_ain(1, 0, true, 0xC00000).unwrap();
    assert_eq!(ain.voltage().unwrap(), expected);
    assert!(expected > 0.0);
}
