#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

#[macro_export]
macro_rules! tok {
    ($text:expr) => {
        $crate::Rule::token($text)
    };
}

#[macro_export]
macro_rules! name {
    ($reference:expr) => {
        $crate::Rule::name($reference)
    };
}

#[macro_export]
macro_rules! alt {
    [ $($child:expr),* $(,)? ] => {
        $crate::Rule::alternatives(vec![ $($child),* ])
    };
}

#[macro_export]
macro_rules! seq {
    [ $($child:expr),* $(,)? ] => {
        $crate::Rule::sequence(vec![ $($child),* ])
    };
}

#[macro_export]
macro_rules! opt {
    ($child:expr) => {
        $crate::Rule::count($child, $crate::Multiplicity::Optional)
    };
}

#[macro_export]
macro_rules! star {
    ($child:expr) => {
        $crate::Rule::count($child, $crate::Multiplicity::ZeroOrMore)
    };
}

#[macro_export]
macro_rules! plus {
    ($child:expr) => {
        $crate::Rule::count($child, $crate::Multiplicity::OnceOrMore)
    };
}

#[macro_export]
macro_rules! tag {
    ($child:expr, $label:expr) => {
        $crate::Rule::tag($child, $label)
    };
}
