use divan::Bencher;
use mads::mesh::GranularMesh;
use mads::point::{Direction, Point};

fn main() {
    divan::main()
}

fn mesh(dim: usize) -> GranularMesh {
    GranularMesh::new(&vec![1.0; dim], &vec![0.0; dim])
}

#[divan::bench(args = [2, 10, 50])]
fn enlarge(bencher: Bencher, dim: usize) {
    let dir = Direction::new(vec![mads::numeric::Scalar::new(1.0); dim]);
    bencher
        .with_inputs(|| mesh(dim))
        .bench_values(|mut m| {
            m.enlarge_delta_frame_size(&dir);
            m
        });
}

#[divan::bench(args = [2, 10, 50])]
fn refine(bencher: Bencher, dim: usize) {
    bencher
        .with_inputs(|| mesh(dim))
        .bench_values(|mut m| {
            m.refine_delta_frame_size();
            m
        });
}

#[divan::bench(args = [2, 10, 50])]
fn project_on_mesh(bencher: Bencher, dim: usize) {
    let m = mesh(dim);
    let center = Point::from_f64(&vec![0.0; dim]);
    let point = Point::from_f64(&vec![0.37; dim]);
    bencher.bench(|| m.project_on_mesh(&point, &center));
}

#[divan::bench(args = [2, 10, 50])]
fn scale_and_project_on_mesh(bencher: Bencher, dim: usize) {
    let m = mesh(dim);
    let dir = Direction::new(vec![mads::numeric::Scalar::new(1.0); dim]);
    bencher.bench(|| m.scale_and_project_on_mesh(&dir));
}
