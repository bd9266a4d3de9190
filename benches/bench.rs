#![feature(test)]

extern crate test;
extern crate tokenroute;

use std::collections::BTreeMap;

use test::Bencher;
use tokenroute::{ParamValue, PathOptions, Pattern};

// template, path
fn match_tests() -> Vec<(&'static str, &'static str)> {
    vec![
        // static
        ("/", "/"),
        ("/about", "/about"),
        ("/about", "/About/"),
        // named
        ("/user/:name", "/user/gordon"),
        ("/blog/:category/:post", "/blog/rust/request-routers"),
        ("/binary-representation/:n", "/binary-representation/1337"),
        // repeated
        ("/sum/:n+", "/sum/1/2/3/4/5/6/7/8/9"),
        ("/r/:name/:args*", "/r/reports.salesPDF"),
        ("/r/:name/:args*", "/r/reports.salesPDF/%7B%22year%22%3A2026%7D/%22q1%22"),
        // custom and wildcard
        ("/post/:id(\\d+)", "/post/42"),
        ("/files/*", "/files/templates/article.html"),
        // misses
        ("/user/:name", "/user/gordon/profile"),
        ("/post/:id(\\d+)", "/post/latest"),
    ]
}

#[bench]
fn bench_compile(b: &mut Bencher) {
    let tests = match_tests();
    b.iter(|| {
        for (template, _) in &tests {
            test::black_box(Pattern::compile(template, PathOptions::exact()).unwrap());
        }
    });
}

#[bench]
fn bench_matches(b: &mut Bencher) {
    let tests: Vec<_> = match_tests()
        .into_iter()
        .map(|(template, path)| (Pattern::compile(template, PathOptions::exact()).unwrap(), path))
        .collect();
    b.iter(|| {
        for (pattern, path) in &tests {
            test::black_box(pattern.matches(path).unwrap());
        }
    });
}

#[bench]
fn bench_build(b: &mut Bencher) {
    let pattern = Pattern::compile("/r/:name/:args*", PathOptions::exact()).unwrap();
    let mut values = BTreeMap::new();
    values.insert("name".to_owned(), ParamValue::from("reports.salesPDF"));
    values.insert(
        "args".to_owned(),
        ParamValue::from(vec!["{\"year\":2026}".to_owned(), "\"q1\"".to_owned()]),
    );
    b.iter(|| test::black_box(pattern.build(&values).unwrap()));
}
