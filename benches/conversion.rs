use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pipeline_model::prelude::*;

const PIPELINE: &str = r#"
pipeline {
    agent { label 'linux' }
    environment {
        CC = 'clang'
        OUT = "${WORKSPACE}/out"
    }
    options { timeout(time: 1, unit: 'HOURS') }
    stages {
        stage('Build') {
            steps {
                sh 'make'
                dir('out') { archiveArtifacts artifacts: '*.bin' }
            }
        }
        stage('Tests') {
            parallel {
                stage('unit') { steps { sh 'make test' } }
                stage('lint') { steps { sh 'make lint' } }
            }
        }
        stage('Matrix') {
            matrix {
                axes {
                    axis { name 'OS'; values 'linux', 'mac', 'windows' }
                    axis { name 'ARCH'; values 'x64', 'arm64' }
                }
                stages { stage('cell') { steps { echo "os ${OS}" } } }
            }
        }
    }
    post { always { echo 'done' } }
}
"#;

fn bench_conversion(c: &mut Criterion) {
    let converter = Converter::default();
    let def = converter
        .script_to_model(PIPELINE)
        .ok()
        .expect("benchmark pipeline is valid");
    let json = converter.model_to_json(&def).to_string();

    c.bench_function("script_to_model", |b| {
        b.iter(|| converter.script_to_model(black_box(PIPELINE)));
    });
    c.bench_function("json_to_model", |b| {
        b.iter(|| converter.json_to_model(black_box(&json)));
    });
    c.bench_function("model_to_script", |b| {
        b.iter(|| converter.model_to_script(black_box(&def)));
    });
    c.bench_function("lower", |b| {
        b.iter(|| converter.lower(black_box(&def)));
    });
}

criterion_group!(benches, bench_conversion);
criterion_main!(benches);
