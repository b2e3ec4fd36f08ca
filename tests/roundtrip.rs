//! End-to-end scenarios from spec.md §8: the six concrete round-trip cases,
//! each exercised from at least one direction (container bytes or Kyra
//! source) with `compile`/`decompile` driving the other.

use emc2_kyra::compile::compile;
use emc2_kyra::decompile::decompile;
use emc2_kyra::program::Program;
use emc2_kyra::word::{encode_long_jump, encode_word};

#[test]
fn empty_text_round_trips_with_exact_rendering() {
    let program = Program {
        order: vec![0],
        strings: Vec::new(),
        data: vec![encode_long_jump(0).unwrap()],
        text_present: false,
    };
    let bytes = program.to_bytes();

    let source = decompile(&bytes).unwrap();
    assert_eq!(source, "strings = {}\n\nglobals = [global_0]\n\nlabel global_0\njmp(0, global_0)\n");

    assert_eq!(compile(&source).unwrap(), bytes);
}

#[test]
fn speech_fold_round_trips() {
    use emc2_kyra::instr::{FLAGS_VALUE, OP_CALL, OP_LEAVE, OP_PUSH};

    let mut strings = vec![String::new(); 6];
    strings[5] = "Hello, traveler!".to_string();

    let data = vec![
        encode_word(OP_PUSH, FLAGS_VALUE, 0x01).unwrap(),
        encode_word(OP_PUSH, FLAGS_VALUE, 0x02).unwrap(),
        encode_word(OP_PUSH, FLAGS_VALUE, 0x05).unwrap(),
        encode_word(OP_CALL, FLAGS_VALUE, 1).unwrap(),
        encode_word(OP_LEAVE, FLAGS_VALUE, 3).unwrap(),
    ];
    let program = Program { order: vec![0], strings, data, text_present: true };
    let bytes = program.to_bytes();

    let source = decompile(&bytes).unwrap();
    assert!(source.contains("speak(0x01, 0x02, s_hello_traveler)"), "{source}");

    assert_eq!(compile(&source).unwrap(), bytes);
}

#[test]
fn title_caption_round_trips() {
    use emc2_kyra::instr::{FLAGS_TWO_WORD, FLAGS_VALUE, OP_CALL, OP_LEAVE, OP_PUSH};

    let mut strings = vec![String::new(); 5];
    strings[4] = "The Dungeon".to_string();

    let data = vec![
        encode_word(OP_PUSH, FLAGS_TWO_WORD, 0).unwrap(),
        0x00B3,
        encode_word(OP_PUSH, FLAGS_VALUE, 0x04).unwrap(),
        encode_word(OP_CALL, FLAGS_VALUE, 139).unwrap(),
        encode_word(OP_LEAVE, FLAGS_VALUE, 2).unwrap(),
    ];
    let program = Program { order: vec![0], strings, data, text_present: true };
    let bytes = program.to_bytes();

    let source = decompile(&bytes).unwrap();
    assert!(source.contains("title(u16(0x00b3), s_title)"), "{source}");

    assert_eq!(compile(&source).unwrap(), bytes);
}

#[test]
fn if_else_round_trips() {
    let src = "strings = {}\n\nglobals = [0]\n\nif cond:\n    push(0x01)\nelse:\n    push(0x02)\n";
    let bytes = compile(src).unwrap();

    let decompiled = decompile(&bytes).unwrap();
    assert!(decompiled.contains("if cond:"), "{decompiled}");
    assert!(decompiled.contains("else:"), "{decompiled}");

    assert_eq!(compile(&decompiled).unwrap(), bytes);
}

#[test]
fn long_jump_target_at_end_of_data_round_trips() {
    let src = "strings = {}\n\nglobals = [0]\n\njmp(0, done)\nlabel done\n";
    let bytes = compile(src).unwrap();

    let decompiled = decompile(&bytes).unwrap();
    assert_eq!(compile(&decompiled).unwrap(), bytes);
}

#[test]
fn structured_desugar_elif_chain_round_trips() {
    let src = "strings = {}\n\nglobals = [0]\n\nif a:\n    push(0x01)\nelif b:\n    push(0x02)\nelse:\n    push(0x03)\n";
    let bytes = compile(src).unwrap();

    let decompiled = decompile(&bytes).unwrap();
    assert_eq!(compile(&decompiled).unwrap(), bytes);
}
