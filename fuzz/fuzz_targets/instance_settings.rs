#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use scoutpost_core::types::InstanceSettings;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 설정 키/값 목록
    pairs: Vec<(String, String)>,
}

fuzz_target!(|input: FuzzInput| {
    let mut settings = InstanceSettings::new();
    for (key, value) in input.pairs.into_iter().take(16) {
        // rejected pairs must leave the settings untouched
        let before = settings.clone();
        if settings.insert(key, value).is_err() {
            assert_eq!(settings, before);
        }
    }

    for (key, value) in settings.iter() {
        assert!(!key.is_empty());
        assert!(!value.contains('\0'));
    }

    let json = serde_json::to_string(&settings).expect("settings serialize");
    let back: InstanceSettings = serde_json::from_str(&json).expect("settings deserialize");
    assert_eq!(back, settings);
});
