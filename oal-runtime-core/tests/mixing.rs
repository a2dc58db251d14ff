use oal_runtime_core::{
    AudioContext, AudioError, ContextConfiguration, ListenerParam, SampleFormat, SourceParam,
    SourceState, Vec3,
};

fn pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn decode(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

fn mono_context() -> AudioContext {
    AudioContext::new(ContextConfiguration {
        output_rate: 8000,
        output_format: SampleFormat::Mono16,
        block_frames: 4,
        ..ContextConfiguration::default()
    })
    .unwrap()
}

#[test]
fn queued_buffers_play_in_order_then_stop() {
    let ctx = mono_context();
    let buffers = ctx.gen_buffers(2);
    ctx.buffer_data(buffers[0], SampleFormat::Mono16, &pcm16(&[1, 2, 3]), 8000)
        .unwrap();
    ctx.buffer_data(buffers[1], SampleFormat::Mono16, &pcm16(&[4, 5]), 8000)
        .unwrap();

    let source = ctx.gen_sources(1)[0];
    ctx.queue_buffers(source, &buffers).unwrap();
    assert_eq!(ctx.buffers_queued(source).unwrap(), 2);
    ctx.play(&[source]).unwrap();

    let mut out = vec![0u8; 16];
    assert_eq!(ctx.mix(&mut out), 8);
    assert_eq!(decode(&out), vec![1, 2, 3, 4, 5, 0, 0, 0]);
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Stopped);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 2);

    let released = ctx.unqueue_buffers(source, 2).unwrap();
    assert_eq!(released, buffers);
    ctx.delete_buffers(&buffers).unwrap();
    assert!(!ctx.is_buffer(buffers[0]));
}

#[test]
fn looping_source_repeats() {
    let ctx = mono_context();
    let buffer = ctx.gen_buffers(1)[0];
    ctx.buffer_data(buffer, SampleFormat::Mono16, &pcm16(&[7, 8, 9]), 8000)
        .unwrap();
    let source = ctx.gen_sources(1)[0];
    ctx.set_source_buffer(source, Some(buffer)).unwrap();
    ctx.set_source(source, SourceParam::Looping(true)).unwrap();
    ctx.play(&[source]).unwrap();

    let mut out = vec![0u8; 14];
    ctx.mix(&mut out);
    assert_eq!(decode(&out), vec![7, 8, 9, 7, 8, 9, 7]);
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Playing);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 0);
}

#[test]
fn attached_buffer_cannot_be_deleted_or_refilled() {
    let ctx = mono_context();
    let buffer = ctx.gen_buffers(1)[0];
    ctx.buffer_data(buffer, SampleFormat::Mono16, &pcm16(&[1, 2]), 8000)
        .unwrap();
    let source = ctx.gen_sources(1)[0];
    ctx.set_source_buffer(source, Some(buffer)).unwrap();

    assert_eq!(
        ctx.delete_buffers(&[buffer]).unwrap_err(),
        AudioError::BufferInUse(buffer.0)
    );
    assert!(matches!(
        ctx.buffer_data(buffer, SampleFormat::Mono16, &pcm16(&[3]), 8000),
        Err(AudioError::InvalidOperation(_))
    ));

    ctx.delete_sources(&[source]).unwrap();
    ctx.delete_buffers(&[buffer]).unwrap();
}

#[test]
fn silent_listener_mutes_everything() {
    let ctx = mono_context();
    let buffer = ctx.gen_buffers(1)[0];
    ctx.buffer_data(buffer, SampleFormat::Mono16, &pcm16(&[1000; 8]), 8000)
        .unwrap();
    let source = ctx.gen_sources(1)[0];
    ctx.set_source_buffer(source, Some(buffer)).unwrap();
    ctx.set_listener(ListenerParam::Gain(0.0)).unwrap();
    ctx.play(&[source]).unwrap();

    let mut out = vec![0xAAu8; 16];
    ctx.mix(&mut out);
    assert!(out.iter().all(|&b| b == 0));
}

#[test]
fn suspended_batch_applies_atomically() {
    let ctx = mono_context();
    let source = ctx.gen_sources(1)[0];
    {
        let mut batch = ctx.suspend();
        batch
            .source_mut(source)
            .unwrap()
            .set(SourceParam::Position(Vec3::new(3.0, 0.0, 0.0)))
            .unwrap();
        batch
            .set_listener(ListenerParam::Position(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
    }
    assert_eq!(ctx.listener().position, Vec3::new(1.0, 0.0, 0.0));
    assert!(matches!(
        ctx.get_source(source, oal_runtime_core::SourceParamKind::Position)
            .unwrap(),
        SourceParam::Position(p) if p == Vec3::new(3.0, 0.0, 0.0)
    ));
}
