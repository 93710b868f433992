use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use rubato::Resampler;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoLocal;

use avatar_realtime::lipsync::LipSyncDriver;
use avatar_realtime::pipeline::{FrameChunker, JitterBuffer, SendQueue, DEFAULT_FRAME_MS};
use avatar_realtime::types::audio::{f32_from_pcm16, WIRE_SAMPLE_RATE};
use avatar_realtime::types::ControlEvent;
use avatar_realtime::{AuthSession, Config, InboundEvent, SessionController};
use avatar_realtime_utils as utils;

const INPUT_CHUNK_SIZE: usize = 1024;
const OUTPUT_CHUNK_SIZE: usize = 1024;
const OUTPUT_LATENCY_MS: usize = 1000;
const SEND_QUEUE_BOUND: usize = 64;
const JITTER_DEPTH: usize = 3;
const RENDER_TICK_MS: u64 = 33;

pub enum Input {
    Audio(Vec<f32>),
    RemoteSpeaking(),
    RemoteSpeakingDone(),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv_override().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let (input_tx, mut input_rx) = tokio::sync::mpsc::channel::<Input>(1024);

    // Setup audio input device
    let input = utils::device::get_or_default_input(None).expect("failed to get input device");
    let input_config = input
        .default_input_config()
        .expect("failed to get default input config");
    let input_config = StreamConfig {
        channels: input_config.channels(),
        sample_rate: input_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    println!(
        "input: device={:?}, config={:?}",
        &input.name().unwrap(),
        &input_config
    );
    let audio_input = input_tx.clone();
    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        if let Err(e) = audio_input.try_send(Input::Audio(data.to_vec())) {
            eprintln!("Failed to send audio data to buffer: {:?}", e);
        }
    };
    let input_stream = input
        .build_input_stream(
            &input_config,
            input_data_fn,
            move |err| eprintln!("an error occurred on input stream: {}", err),
            None,
        )
        .expect("failed to build input stream");
    input_stream.play().expect("failed to play input stream");
    let input_sample_rate = input_config.sample_rate.0 as f64;

    // Setup audio output device
    let output = utils::device::get_or_default_output(None).expect("failed to get output device");
    let output_config = output
        .default_output_config()
        .expect("failed to get default output config");
    let output_config = StreamConfig {
        channels: output_config.channels(),
        sample_rate: output_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let output_channel_count = output_config.channels as usize;
    let output_sample_rate = output_config.sample_rate.0 as f64;
    println!(
        "output: device={:?}, config={:?}",
        &output.name().unwrap(),
        &output_config
    );

    let audio_out_buffer =
        utils::audio::shared_buffer(output_sample_rate as usize * OUTPUT_LATENCY_MS / 1000);
    let (mut audio_out_tx, mut audio_out_rx) = audio_out_buffer.split();

    // Samples actually played, for the lip-sync playback clock
    let samples_played = Arc::new(AtomicU64::new(0));

    let playback_counter = samples_played.clone();
    let client_ctrl = input_tx.clone();
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let mut sample_index = 0;
        let mut played = 0u64;
        while sample_index < data.len() {
            let sample = match audio_out_rx.try_pop() {
                Some(sample) => {
                    played += 1;
                    sample
                }
                None => 0.0,
            };

            // L channel (ch:0)
            if sample_index < data.len() {
                data[sample_index] = sample;
                sample_index += 1;
            }
            // R channel (ch:1)
            if output_channel_count > 1 && sample_index < data.len() {
                data[sample_index] = sample;
                sample_index += 1;
            }
            // ignore other channels
            sample_index += output_channel_count.saturating_sub(2);
        }

        playback_counter.fetch_add(played, Ordering::Relaxed);
        let event = if played == 0 {
            Input::RemoteSpeakingDone()
        } else {
            Input::RemoteSpeaking()
        };
        if let Err(e) = client_ctrl.try_send(event) {
            eprintln!("Failed to send speaking event to client: {:?}", e);
        }
    };
    let output_stream = output
        .build_output_stream(
            &output_config,
            output_data_fn,
            move |err| eprintln!("an error occurred on output stream: {}", err),
            None,
        )
        .expect("failed to build output stream");
    output_stream.play().expect("failed to play output stream");

    // Session: config from the environment, demo identity standing in
    // for the real identity layer
    let mut controller = SessionController::new(Config::new());
    controller.authenticate(AuthSession::new("demo-user"));
    controller
        .start_talking()
        .await
        .expect("failed to start talking session");
    println!(
        "avatar: file={:?}, jaw bone={:?}",
        controller.avatar_file(),
        controller.jaw_bone()
    );

    let driver = Arc::new(Mutex::new(LipSyncDriver::new(controller.jaw_bone())));

    // Inbound audio: resample from the wire rate to the output device
    let (post_tx, mut post_rx) = tokio::sync::mpsc::channel::<Vec<i16>>(100);
    let post_process = tokio::spawn(async move {
        let mut out_resampler =
            utils::audio::create_resampler(WIRE_SAMPLE_RATE as f64, output_sample_rate, 100)
                .expect("failed to create resampler for output");
        while let Some(pcm) = post_rx.recv().await {
            let samples = f32_from_pcm16(&pcm);
            let chunk_size = out_resampler.input_frames_next();
            for chunk in utils::audio::split_for_chunks(&samples, chunk_size) {
                if let Ok(resampled) = out_resampler.process(&[chunk.as_slice()], None) {
                    if let Some(resampled) = resampled.first() {
                        for sample in resampled {
                            if let Err(e) = audio_out_tx.try_push(*sample) {
                                eprintln!("Failed to push samples to buffer: {:?}", e);
                            }
                        }
                    }
                }
            }
        }
    });

    // Inbound events: audio through the jitter buffer to playback,
    // markers to the lip-sync driver
    let mut server_events = controller.events().expect("failed to get server events");
    let event_driver = driver.clone();
    let server_handle = tokio::spawn(async move {
        let mut jitter = JitterBuffer::new(JITTER_DEPTH);
        while let Ok(event) = server_events.recv().await {
            match event {
                InboundEvent::Audio(frame) => {
                    jitter.push(frame);
                    while let Some(frame) = jitter.pop() {
                        if let Err(e) = post_tx.send(frame.pcm().to_vec()).await {
                            eprintln!("Failed to send audio data to resampler: {:?}", e);
                        }
                    }
                }
                InboundEvent::Control(control) => {
                    match &control {
                        ControlEvent::SpeechStarted { t_ms } => {
                            println!("speech started at {}ms", t_ms);
                        }
                        ControlEvent::SpeechEnded { t_ms } => {
                            println!("speech ended at {}ms", t_ms);
                        }
                        ControlEvent::Error { message, .. } => {
                            eprintln!("backend error: {}", message);
                        }
                        _ => {}
                    }
                    if let Ok(mut driver) = event_driver.lock() {
                        driver.on_event(&control);
                    }
                }
                InboundEvent::Closed { reason } => {
                    println!("connection closed: {:?}", reason);
                    break;
                }
                InboundEvent::Fatal { attempts } => {
                    eprintln!("connection lost after {} reconnect attempts", attempts);
                    break;
                }
            }
        }
    });

    // Render tick: drive the jaw bone from the playback clock
    let tick_driver = driver.clone();
    let tick_counter = samples_played.clone();
    let render_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(RENDER_TICK_MS));
        loop {
            ticker.tick().await;
            let playback_ms =
                tick_counter.load(Ordering::Relaxed) * 1000 / output_sample_rate as u64;
            if let Ok(mut driver) = tick_driver.lock() {
                let frame = driver.tick(playback_ms);
                if frame.rotation() > 0.0 {
                    tracing::debug!(
                        "jaw rotation {:.3}rad at {}ms",
                        frame.rotation(),
                        frame.t_ms()
                    );
                }
            }
        }
    });

    // Outbound: resample the microphone to the wire rate, chunk, queue
    let outbound = controller.outbound().expect("no outbound channel");
    let client_handle = tokio::spawn(async move {
        let mut in_resampler = utils::audio::create_resampler(
            input_sample_rate,
            WIRE_SAMPLE_RATE as f64,
            INPUT_CHUNK_SIZE,
        )
        .expect("failed to create resampler for input");
        let mut chunker = FrameChunker::new(DEFAULT_FRAME_MS);
        let mut queue = SendQueue::new(SEND_QUEUE_BOUND);
        let mut remote_speaking = false;

        while let Some(input) = input_rx.recv().await {
            match input {
                Input::RemoteSpeaking() => {
                    remote_speaking = true;
                }
                Input::RemoteSpeakingDone() => {
                    remote_speaking = false;
                }
                Input::Audio(samples) => {
                    // half-duplex gate: do not talk over the avatar
                    if remote_speaking {
                        continue;
                    }
                    for chunk in utils::audio::split_for_chunks(&samples, INPUT_CHUNK_SIZE) {
                        if let Ok(resampled) = in_resampler.process(&[chunk.as_slice()], None) {
                            if let Some(resampled) = resampled.first() {
                                for frame in chunker.push(resampled) {
                                    if queue.push(frame).is_err() {
                                        tracing::warn!("microphone outrunning the network");
                                    }
                                }
                            }
                        }
                    }
                    while let Some(frame) = queue.pop() {
                        if let Err(e) =
                            outbound.try_send(avatar_realtime::types::WireFrame::Audio(frame))
                        {
                            eprintln!("Failed to send audio frame: {:?}", e);
                            break;
                        }
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = post_process => {},
        _ = server_handle => {},
        _ = client_handle => {},
        _ = render_handle => {},
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl-C, shutting down...");
        }
    }
    controller.on_sign_out().await;
    println!("Shutting down...");
}
