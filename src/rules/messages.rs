//! Message catalogs for the basic rule engine

/// Which message a failed rule produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageKind {
    Required,
    String,
    Integer,
    Numeric,
    Boolean,
    Array,
    In,
    InArray,
    MinNumeric,
    MinString,
    MinArray,
    MaxNumeric,
    MaxString,
    MaxArray,
    Same,
    Different,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Catalog {
    En,
    Ko,
}

impl Catalog {
    /// `ko`, `ko_KR` and `ko-KR` select Korean; anything else is English
    fn for_locale(locale: &str) -> Self {
        let language = locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match language.as_str() {
            "ko" => Catalog::Ko,
            _ => Catalog::En,
        }
    }

    fn template(self, kind: MessageKind) -> &'static str {
        use MessageKind::*;
        match self {
            Catalog::En => match kind {
                Required => "The :attribute field is required.",
                String => "The :attribute must be a string.",
                Integer => "The :attribute must be an integer.",
                Numeric => "The :attribute must be a number.",
                Boolean => "The :attribute field must be true or false.",
                Array => "The :attribute must be an array.",
                In => "The selected :attribute is invalid.",
                InArray => "The :attribute field does not exist in :other.",
                MinNumeric => "The :attribute must be at least :min.",
                MinString => "The :attribute must be at least :min characters.",
                MinArray => "The :attribute must have at least :min items.",
                MaxNumeric => "The :attribute may not be greater than :max.",
                MaxString => "The :attribute may not be greater than :max characters.",
                MaxArray => "The :attribute may not have more than :max items.",
                Same => "The :attribute and :other must match.",
                Different => "The :attribute and :other must be different.",
                Regex => "The :attribute format is invalid.",
            },
            Catalog::Ko => match kind {
                Required => ":attribute 항목은 필수입니다.",
                String => ":attribute 항목은 문자열이어야 합니다.",
                Integer => ":attribute 항목은 정수여야 합니다.",
                Numeric => ":attribute 항목은 숫자여야 합니다.",
                Boolean => ":attribute 항목은 true 또는 false 여야 합니다.",
                Array => ":attribute 항목은 배열이어야 합니다.",
                In => "선택한 :attribute 항목이 올바르지 않습니다.",
                InArray => ":attribute 항목이 :other 에 존재하지 않습니다.",
                MinNumeric => ":attribute 항목은 :min 이상이어야 합니다.",
                MinString => ":attribute 항목은 최소 :min 자여야 합니다.",
                MinArray => ":attribute 항목은 최소 :min 개가 있어야 합니다.",
                MaxNumeric => ":attribute 항목은 :max 이하여야 합니다.",
                MaxString => ":attribute 항목은 :max 자를 넘을 수 없습니다.",
                MaxArray => ":attribute 항목은 :max 개를 넘을 수 없습니다.",
                Same => ":attribute 항목과 :other 항목이 일치해야 합니다.",
                Different => ":attribute 항목과 :other 항목은 달라야 합니다.",
                Regex => ":attribute 형식이 올바르지 않습니다.",
            },
        }
    }
}

/// Render a message for `kind`, filling `:placeholder`s
pub(crate) fn render(locale: &str, kind: MessageKind, replacements: &[(&str, &str)]) -> String {
    let mut message = Catalog::for_locale(locale).template(kind).to_string();
    for (placeholder, value) in replacements {
        message = message.replace(placeholder, value);
    }
    message
}
