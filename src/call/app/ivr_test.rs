//! Tests for the pixel IVR.
//!
//! Uses [`MockCallStack`] to drive a [`PixelIvr`](super::PixelIvr) through a
//! scripted caller without any SIP stack or drawing backend.

#[cfg(test)]
mod tests {
    use crate::call::app::testing::{CallerInput, Fault, MockCallStack};
    use crate::callrecord::Disposition;
    use crate::config::DEFAULT_COLORS;
    use crate::call::app::PixelCommand;
    use crate::drawing::{DrawingService, MockDrawingService};
    use crate::media::prompt::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::Instant;

    struct PanickingDrawing;

    #[async_trait]
    impl DrawingService for PanickingDrawing {
        async fn submit(&self, _command: &PixelCommand) -> bool {
            panic!("drawing backend exploded")
        }
    }

    fn accepting() -> MockDrawingService {
        let mut drawing = MockDrawingService::new();
        drawing.expect_submit().times(1).returning(|_| true);
        drawing
    }

    fn unused() -> MockDrawingService {
        let mut drawing = MockDrawingService::new();
        drawing.expect_submit().never();
        drawing
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path() {
        let mut drawing = MockDrawingService::new();
        drawing
            .expect_submit()
            .withf(|c| c.x == 1 && c.y == 2 && c.color == DEFAULT_COLORS[2])
            .times(1)
            .returning(|_| true);

        let t = MockCallStack::new(drawing)
            .caller_input(CallerInput::digits("#1#2#3*"))
            .run()
            .await;

        assert!(t.accepted);
        assert_eq!(t.prompts, vec![WELCOME, INPUT, SAVING, SUCCESS, BYE]);
        assert_eq!(t.hangups, 1);
        assert_eq!(t.record.disposition, Disposition::Success);
        assert!(t.record.succeeded);
        assert_eq!(t.record.attempts, 1);
        let command = t.record.command.unwrap();
        assert_eq!((command.x, command.y), (1, 2));
        assert!(t.record.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leading_garbage_is_skipped() {
        let t = MockCallStack::new(accepting())
            .caller_input(CallerInput::digits("0815#1#2#3*"))
            .run()
            .await;

        assert_eq!(t.record.disposition, Disposition::Success);
        let command = t.record.command.unwrap();
        assert_eq!(command.color, DEFAULT_COLORS[2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_color_out_of_range_retries() {
        let t = MockCallStack::new(accepting())
            .caller_input(CallerInput::digits("#5#5#99*"))
            .caller_input(CallerInput::digits("#5#5#1*"))
            .run()
            .await;

        assert_eq!(
            t.prompts,
            vec![WELCOME, INPUT, INVALID, TRY_AGAIN, INPUT, SAVING, SUCCESS, BYE]
        );
        assert_eq!(t.record.attempts, 2);
        assert_eq!(t.record.command.unwrap().color, DEFAULT_COLORS[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound() {
        let t = MockCallStack::new(unused())
            .caller_input(CallerInput::digits("#1#2*"))
            .caller_input(CallerInput::digits("#a#b#c*"))
            .caller_input(CallerInput::digits("#1#2#3"))
            .caller_input(CallerInput::digits("#1#2#3*"))
            .config(|c| c.max_digits = 6)
            .run()
            .await;

        assert_eq!(t.count(INPUT), 3);
        assert_eq!(t.count(INVALID), 3);
        // no "try again" after the final attempt
        assert_eq!(t.count(TRY_AGAIN), 2);
        assert_eq!(t.count(SAVING), 0);
        assert_eq!(t.prompts.last().map(String::as_str), Some(BYE));
        assert_eq!(t.hangups, 1);
        assert_eq!(t.record.disposition, Disposition::NoInput);
        assert_eq!(t.record.attempts, 3);
        assert!(t.record.command.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_exhausts_attempts() {
        let started = Instant::now();
        let t = MockCallStack::new(unused()).run().await;

        assert_eq!(t.prompts, vec![WELCOME, INPUT, INPUT, INPUT, BYE]);
        assert_eq!(t.record.disposition, Disposition::NoInput);
        assert_eq!(t.record.attempts, 3);
        assert!(!t.record.succeeded);
        assert_eq!(t.hangups, 1);
        assert!(started.elapsed() >= Duration::from_secs(3 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_hangs_up_while_collecting() {
        let t = MockCallStack::new(unused())
            .caller_input(CallerInput::Hangup)
            .run()
            .await;

        assert_eq!(t.prompts, vec![WELCOME, INPUT]);
        assert_eq!(t.hangups, 0);
        assert_eq!(t.record.disposition, Disposition::InvalidState);
        assert_eq!(t.record.attempts, 1);
        assert!(t.record.command.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_on_final_attempt() {
        let mut drawing = MockDrawingService::new();
        drawing.expect_submit().times(1).returning(|_| false);

        let t = MockCallStack::new(drawing)
            .caller_input(CallerInput::Silence)
            .caller_input(CallerInput::digits("#1#1#0*"))
            .caller_input(CallerInput::digits("#7#8#4*"))
            .run()
            .await;

        assert_eq!(
            t.prompts,
            vec![WELCOME, INPUT, INPUT, INVALID, TRY_AGAIN, INPUT, SAVING, ERROR, BYE]
        );
        assert_eq!(t.hangups, 1);
        assert_eq!(t.record.disposition, Disposition::SubmitFailed);
        assert!(!t.record.succeeded);
        assert_eq!(t.record.attempts, 3);
        let command = t.record.command.unwrap();
        assert_eq!((command.x, command.y), (7, 8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_valid_command_ends_collection() {
        let mut drawing = MockDrawingService::new();
        drawing.expect_submit().times(1).returning(|_| false);

        let t = MockCallStack::new(drawing)
            .caller_input(CallerInput::digits("#1#1#1*"))
            .caller_input(CallerInput::digits("#2#2#2*"))
            .run()
            .await;

        assert_eq!(t.count(INPUT), 1);
        assert_eq!(t.record.attempts, 1);
        assert_eq!(t.record.disposition, Disposition::SubmitFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_error_plays_error_and_bye() {
        let t = MockCallStack::new(PanickingDrawing)
            .caller_input(CallerInput::digits("#1#2#3*"))
            .run()
            .await;

        assert_eq!(t.prompts, vec![WELCOME, INPUT, SAVING, ERROR, BYE]);
        assert_eq!(t.hangups, 1);
        assert_eq!(t.record.disposition, Disposition::Error);
        assert!(t
            .record
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("drawing backend exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_digits_are_flushed() {
        let mut drawing = MockDrawingService::new();
        drawing
            .expect_submit()
            .withf(|c| c.x == 1)
            .times(1)
            .returning(|_| true);

        let t = MockCallStack::new(drawing)
            .early_digits("#9#9#9*")
            .caller_input(CallerInput::digits("#1#2#3*"))
            .run()
            .await;

        assert_eq!(t.record.disposition, Disposition::Success);
        assert_eq!(t.record.command.unwrap().x, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_prompt_before_welcome() {
        let t = MockCallStack::new(accepting())
            .config(|c| c.waiting_divisor = Some((2, 2)))
            .caller_input(CallerInput::digits("#1#2#3*"))
            .run()
            .await;

        assert_eq!(
            t.prompts,
            vec![WAITING, WELCOME, INPUT, SAVING, SUCCESS, BYE]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_has_no_try_again() {
        let t = MockCallStack::new(unused())
            .config(|c| c.max_retries = 1)
            .caller_input(CallerInput::digits("#1#2#33*"))
            .run()
            .await;

        assert_eq!(t.prompts, vec![WELCOME, INPUT, INVALID, BYE]);
        assert_eq!(t.record.disposition, Disposition::NoInput);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bye_pause_before_hangup() {
        let started = Instant::now();
        let t = MockCallStack::new(accepting())
            .config(|c| c.bye_pause_ms = 2000)
            .caller_input(CallerInput::digits("#1#2#3*"))
            .run()
            .await;

        assert_eq!(t.hangups, 1);
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dtmf_transport_error_recovers() {
        let t = MockCallStack::new(unused())
            .fault(Fault::DtmfTransport)
            .run()
            .await;

        assert_eq!(t.prompts, vec![WELCOME, INPUT, ERROR, BYE]);
        assert_eq!(t.hangups, 1);
        assert_eq!(t.record.disposition, Disposition::Error);
        assert_eq!(t.record.attempts, 1);
        assert!(t
            .record
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("rtp socket closed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cleanup_hangup_is_ignored() {
        let t = MockCallStack::new(unused())
            .fault(Fault::DtmfTransport)
            .fault(Fault::HangupTransport)
            .run()
            .await;

        assert_eq!(t.prompts, vec![WELCOME, INPUT, ERROR, BYE]);
        assert_eq!(t.hangups, 0);
        assert_eq!(t.record.disposition, Disposition::Error);
        assert!(t
            .record
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("rtp socket closed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_cleanup_is_contained() {
        let t = MockCallStack::new(unused())
            .fault(Fault::DtmfTransport)
            .fault(Fault::HangupPanics)
            .run()
            .await;

        assert_eq!(t.prompts, vec![WELCOME, INPUT, ERROR, BYE]);
        assert_eq!(t.hangups, 0);
        assert_eq!(t.record.disposition, Disposition::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hangup_after_partial_digits() {
        let t = MockCallStack::new(unused())
            .caller_input(CallerInput::DigitsThenHangup("#4#5#".to_string()))
            .run()
            .await;

        assert_eq!(t.prompts, vec![WELCOME, INPUT]);
        assert_eq!(t.hangups, 0);
        assert_eq!(t.record.disposition, Disposition::InvalidState);
        assert_eq!(t.record.attempts, 1);
        assert!(t.record.command.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_leaves_during_bye() {
        let t = MockCallStack::new(accepting())
            .hangup_on(BYE)
            .caller_input(CallerInput::digits("#1#2#3*"))
            .run()
            .await;

        assert_eq!(t.prompts, vec![WELCOME, INPUT, SAVING, SUCCESS, BYE]);
        assert_eq!(t.hangups, 0);
        assert_eq!(t.record.disposition, Disposition::Success);
        assert!(t.record.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hangup_on_ended_call_keeps_disposition() {
        let t = MockCallStack::new(accepting())
            .fault(Fault::HangupInvalidState)
            .caller_input(CallerInput::digits("#1#2#3*"))
            .run()
            .await;

        assert_eq!(t.prompts, vec![WELCOME, INPUT, SAVING, SUCCESS, BYE]);
        assert_eq!(t.hangups, 0);
        assert_eq!(t.record.disposition, Disposition::Success);
        assert!(t.record.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_final_hangup_is_an_error() {
        let t = MockCallStack::new(accepting())
            .fault(Fault::HangupTransport)
            .caller_input(CallerInput::digits("#1#2#3*"))
            .run()
            .await;

        assert_eq!(t.hangups, 0);
        assert_eq!(t.record.disposition, Disposition::Error);
        assert!(t.record.succeeded);
    }
}
